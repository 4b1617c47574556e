//! Environment-to-URL resolution.

use std::sync::Arc;

use crate::error::{SwitcherError, SwitcherResult};
use crate::store::StorageDriver;
use crate::types::{ArtifactUrl, EnvName};

/// Resolves an environment name to its bound artifact URL.
///
/// A missing environment name is a [`SwitcherError::ConfigurationDefect`];
/// a missing or empty binding is [`SwitcherError::UnboundEnvironment`].
/// The two are never conflated.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use switcher_core::{Binding, EnvName, MemoryStore, Resolver};
///
/// # tokio_test::block_on(async {
/// let prod = EnvName::new("prod").unwrap();
/// let store = MemoryStore::with_bindings([Binding {
///     env: prod.clone(),
///     url: "https://example.com/a.html".to_string(),
/// }]);
/// let resolver = Resolver::new(Arc::new(store));
///
/// let url = resolver.resolve(Some(&prod)).await.unwrap();
/// assert_eq!(url.as_str(), "https://example.com/a.html");
/// # });
/// ```
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn StorageDriver>,
}

impl Resolver {
    /// Creates a resolver reading from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StorageDriver>) -> Self {
        Self { store }
    }

    /// Returns the underlying storage driver.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StorageDriver> {
        &self.store
    }

    /// Resolves `env` to a parsed URL.
    ///
    /// # Errors
    ///
    /// - [`SwitcherError::ConfigurationDefect`] when `env` is `None`
    /// - [`SwitcherError::UnboundEnvironment`] when nothing (or an empty string) is bound
    /// - [`SwitcherError::MalformedBinding`] when the bound value is not an absolute URL
    pub async fn resolve(&self, env: Option<&EnvName>) -> SwitcherResult<ArtifactUrl> {
        let env = env.ok_or(SwitcherError::ConfigurationDefect)?;

        let raw = match self.store.get(env).await {
            Some(raw) if !raw.is_empty() => raw,
            _ => {
                tracing::debug!(env = %env, "environment has no binding");
                return Err(SwitcherError::unbound(env.as_str()));
            }
        };

        ArtifactUrl::parse(&raw).map_err(|e| {
            tracing::debug!(env = %env, binding = %raw, error = %e, "binding is not a valid url");
            SwitcherError::malformed_binding(env.as_str(), raw.as_str(), e.to_string())
        })
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::store::MemoryStore;
    use crate::types::Binding;
    use proptest::prelude::*;

    fn resolver_with(bindings: &[(&str, &str)]) -> Resolver {
        let store = MemoryStore::with_bindings(bindings.iter().map(|(env, url)| Binding {
            env: EnvName::new(*env).unwrap(),
            url: (*url).to_string(),
        }));
        Resolver::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_missing_env_is_configuration_defect() {
        let resolver = resolver_with(&[]);
        let err = resolver.resolve(None).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ConfigurationDefect);
    }

    #[tokio::test]
    async fn test_unbound_env() {
        let resolver = resolver_with(&[("prod", "https://example.com/a.html")]);
        let staging = EnvName::new("staging").unwrap();
        let err = resolver.resolve(Some(&staging)).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::UnboundEnvironment);
    }

    #[tokio::test]
    async fn test_empty_binding_is_unbound() {
        let resolver = resolver_with(&[("prod", "")]);
        let prod = EnvName::new("prod").unwrap();
        let err = resolver.resolve(Some(&prod)).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::UnboundEnvironment);
    }

    #[tokio::test]
    async fn test_relative_binding_is_malformed() {
        let resolver = resolver_with(&[("prod", "a.html")]);
        let prod = EnvName::new("prod").unwrap();
        let err = resolver.resolve(Some(&prod)).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MalformedBinding);
    }

    #[tokio::test]
    async fn test_resolves_bound_url() {
        let resolver = resolver_with(&[("prod", "https://example.com/a.html")]);
        let prod = EnvName::new("prod").unwrap();
        let url = resolver.resolve(Some(&prod)).await.unwrap();
        assert_eq!(url.as_str(), "https://example.com/a.html");
    }

    proptest! {
        #[test]
        fn prop_unbound_env_never_panics(name in "[a-z0-9-]{1,24}") {
            let resolver = resolver_with(&[]);
            let env = EnvName::new(name).unwrap();
            let result = tokio_test::block_on(resolver.resolve(Some(&env)));
            prop_assert_eq!(
                result.unwrap_err().category(),
                ErrorCategory::UnboundEnvironment
            );
        }
    }
}
