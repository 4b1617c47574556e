//! Content caching for CACHE-mode delivery.
//!
//! Holds the last fetched artifact text per environment. Entries never
//! expire; they are replaced by the next fetch for the same environment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use crate::types::EnvName;

/// Lookup/store capability over cached artifact text.
pub trait ContentCache: Send + Sync + 'static {
    /// Returns the cached text for `env`, if any.
    fn get(&self, env: &EnvName) -> Option<String>;

    /// Like [`ContentCache::get`], but not counted as a lookup by caches that
    /// keep statistics.
    fn peek(&self, env: &EnvName) -> Option<String> {
        self.get(env)
    }

    /// Stores `text` for `env`, replacing any previous entry.
    fn set(&self, env: &EnvName, text: String);
}

/// Configuration for [`MemoryCache`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheConfig {
    /// Maximum number of environments held. `0` means unbounded.
    pub max_entries: usize,
}

impl CacheConfig {
    /// An unbounded cache.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self { max_entries: 0 }
    }

    /// A cache holding at most `max_entries` environments.
    #[must_use]
    pub const fn bounded(max_entries: usize) -> Self {
        Self { max_entries }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    text: String,
    stored_at: Instant,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of `get` lookups that found an entry. `peek` is not counted.
    pub hits: u64,
    /// Number of `get` lookups that found nothing.
    pub misses: u64,
    /// Number of entries currently cached.
    pub size: usize,
    /// Number of entries dropped to stay within `max_entries`.
    pub evictions: u64,
}

/// In-memory [`ContentCache`] guarded by a read/write lock.
///
/// # Example
///
/// ```
/// use switcher_core::{CacheConfig, ContentCache, EnvName, MemoryCache};
///
/// let cache = MemoryCache::new(CacheConfig::unbounded());
/// let prod = EnvName::new("prod").unwrap();
/// assert!(cache.get(&prod).is_none());
///
/// cache.set(&prod, "<html></html>".to_string());
/// assert_eq!(cache.get(&prod).as_deref(), Some("<html></html>"));
/// assert_eq!(cache.stats().hits, 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryCache {
    config: CacheConfig,
    entries: RwLock<HashMap<EnvName, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Returns `true` if an entry exists for `env`, without counting a lookup.
    #[must_use]
    pub fn contains(&self, env: &EnvName) -> bool {
        self.entries.read().contains_key(env)
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.entries.read().len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_oldest(&self, entries: &mut HashMap<EnvName, CacheEntry>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.stored_at)
            .map(|(env, _)| env.clone());

        if let Some(env) = oldest {
            entries.remove(&env);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl ContentCache for MemoryCache {
    fn get(&self, env: &EnvName) -> Option<String> {
        let found = self.entries.read().get(env).map(|e| e.text.clone());
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn peek(&self, env: &EnvName) -> Option<String> {
        self.entries.read().get(env).map(|e| e.text.clone())
    }

    fn set(&self, env: &EnvName, text: String) {
        let mut entries = self.entries.write();

        if self.config.max_entries > 0 && !entries.contains_key(env) {
            while entries.len() >= self.config.max_entries {
                let before = entries.len();
                self.evict_oldest(&mut entries);
                if entries.len() == before {
                    break;
                }
            }
        }

        entries.insert(
            env.clone(),
            CacheEntry {
                text,
                stored_at: Instant::now(),
            },
        );
    }
}
