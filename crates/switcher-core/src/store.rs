//! Binding storage.
//!
//! [`StorageDriver`] is the read/write capability over the binding table.
//! Misses are soft (`None`) and write failures are reported as `false`;
//! callers turn these into [`SwitcherError`](crate::SwitcherError) values.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::types::{Binding, EnvName};
use crate::BoxFuture;

/// Read/write access to environment bindings.
///
/// Implementations must be last-write-wins for a single environment.
pub trait StorageDriver: Send + Sync + 'static {
    /// Returns the URL bound to `env`, or `None` if there is no binding.
    fn get<'a>(&'a self, env: &'a EnvName) -> BoxFuture<'a, Option<String>>;

    /// Binds `url` to `env`, returning `false` if the write did not persist.
    fn set<'a>(&'a self, url: &'a str, env: &'a EnvName) -> BoxFuture<'a, bool>;
}

/// Process-memory binding table.
///
/// # Example
///
/// ```
/// use switcher_core::{EnvName, MemoryStore, StorageDriver};
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// let prod = EnvName::new("prod").unwrap();
/// assert!(store.set("https://example.com/a.html", &prod).await);
/// assert_eq!(store.get(&prod).await.as_deref(), Some("https://example.com/a.html"));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    bindings: RwLock<HashMap<EnvName, String>>,
    read_only: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given bindings.
    #[must_use]
    pub fn with_bindings(bindings: impl IntoIterator<Item = Binding>) -> Self {
        let map = bindings.into_iter().map(|b| (b.env, b.url)).collect();
        Self {
            bindings: RwLock::new(map),
            read_only: AtomicBool::new(false),
        }
    }

    /// Rejects (or re-allows) writes. A read-only store answers `false` to `set`.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Returns a snapshot of every binding, sorted by environment.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Binding> {
        let mut bindings: Vec<Binding> = self
            .bindings
            .read()
            .iter()
            .map(|(env, url)| Binding {
                env: env.clone(),
                url: url.clone(),
            })
            .collect();
        bindings.sort_by(|a, b| a.env.cmp(&b.env));
        bindings
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Returns `true` if no environment is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl StorageDriver for MemoryStore {
    fn get<'a>(&'a self, env: &'a EnvName) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move { self.bindings.read().get(env).cloned() })
    }

    fn set<'a>(&'a self, url: &'a str, env: &'a EnvName) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if self.read_only.load(Ordering::SeqCst) {
                return false;
            }
            self.bindings.write().insert(env.clone(), url.to_string());
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> EnvName {
        EnvName::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_is_soft() {
        let store = MemoryStore::new();
        assert_eq!(store.get(&env("nowhere")).await, None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();
        let prod = env("prod");
        assert!(store.set("https://example.com/v1.html", &prod).await);
        assert!(store.set("https://example.com/v2.html", &prod).await);
        assert_eq!(
            store.get(&prod).await.as_deref(),
            Some("https://example.com/v2.html")
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let store = MemoryStore::with_bindings([Binding {
            env: env("prod"),
            url: "https://example.com/a.html".to_string(),
        }]);
        store.set_read_only(true);

        assert!(!store.set("https://example.com/b.html", &env("prod")).await);
        assert_eq!(
            store.get(&env("prod")).await.as_deref(),
            Some("https://example.com/a.html")
        );
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let store = MemoryStore::with_bindings([
            Binding {
                env: env("staging"),
                url: "https://example.com/s".to_string(),
            },
            Binding {
                env: env("prod"),
                url: "https://example.com/p".to_string(),
            },
        ]);
        let names: Vec<_> = store
            .snapshot()
            .into_iter()
            .map(|b| b.env.to_string())
            .collect();
        assert_eq!(names, ["prod", "staging"]);
    }
}
