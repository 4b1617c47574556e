//! The delivery engine.
//!
//! Given an environment and a [`DeliveryMode`], the engine resolves the bound
//! URL and then, depending on the mode, attaches it, streams it, serves it
//! through the content cache, or hydrates it.
//!
//! ```text
//! env ─► Resolver ─► URL ─┬─ DEFER ───► Deferred(url)
//!                         ├─ STREAM ──► fetch_stream ─► Stream(body | none)
//!                         ├─ CACHE ───► cache hit? ─► Text (+ background refresh)
//!                         │                  └ miss ─► fetch_text ─► store ─► Text
//!                         └─ HYDRATE ─► fetch_text ─► hydrate ─► Text
//! ```
//!
//! Cache fills for one environment are single-flight: concurrent misses
//! queue on a per-environment lock and re-check the cache once they hold it.

use std::sync::Arc;

use dashmap::DashMap;
use switcher_core::{
    hydrate, ArtifactBody, ArtifactUrl, ContentCache, DeliveryMode, EnvName, Fetcher,
    HydrationPayload, Resolver, StorageDriver, SwitcherError, SwitcherResult,
};
use switcher_telemetry::metrics::{record_cache_lookup, record_upstream_fetch};
use tokio::sync::Mutex;

/// What a delivery produced.
#[derive(Debug)]
pub enum Delivery {
    /// DEFER: the resolved URL, for a downstream stage to use.
    Deferred(ArtifactUrl),
    /// STREAM: a live body, or `None` if upstream had nothing to stream.
    Stream(Option<ArtifactBody>),
    /// CACHE / HYDRATE: buffered artifact text.
    Text(String),
}

type FillLocks = DashMap<EnvName, Arc<Mutex<()>>>;

/// Resolves environments and delivers their artifacts.
///
/// The engine is the sole owner of its content cache; build one per process
/// and share it between routes with `Arc`.
pub struct DeliveryEngine {
    resolver: Resolver,
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn ContentCache>,
    refresh_on_hit: bool,
    fills: Arc<FillLocks>,
}

impl DeliveryEngine {
    /// Creates an engine.
    ///
    /// With `refresh_on_hit`, a CACHE hit is answered from the cache and a
    /// background fetch then overwrites the entry.
    #[must_use]
    pub fn new(
        store: Arc<dyn StorageDriver>,
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<dyn ContentCache>,
        refresh_on_hit: bool,
    ) -> Self {
        Self {
            resolver: Resolver::new(store),
            fetcher,
            cache,
            refresh_on_hit,
            fills: Arc::new(DashMap::new()),
        }
    }

    /// Returns the resolver.
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Delivers `env` in `mode`.
    ///
    /// Resolution always runs first; a resolution failure means nothing is
    /// fetched. `payload` is only read in HYDRATE mode.
    ///
    /// # Errors
    ///
    /// Resolver failures, and [`SwitcherError::UpstreamFetchFailure`] for
    /// fetch failures.
    pub async fn deliver(
        &self,
        env: Option<&EnvName>,
        mode: DeliveryMode,
        payload: &HydrationPayload,
    ) -> SwitcherResult<Delivery> {
        let env = env.ok_or(SwitcherError::ConfigurationDefect)?;
        let url = self.resolver.resolve(Some(env)).await?;

        tracing::debug!(env = %env, mode = %mode, url = %url, "resolved binding");

        match mode {
            DeliveryMode::Defer => Ok(Delivery::Deferred(url)),
            DeliveryMode::Stream => self.stream(&url).await.map(Delivery::Stream),
            DeliveryMode::Cache => self.cached(env, url).await.map(Delivery::Text),
            DeliveryMode::Hydrate => {
                let text = self.fetch_text(mode, &url).await?;
                Ok(Delivery::Text(hydrate(&text, payload)))
            }
        }
    }

    async fn stream(&self, url: &ArtifactUrl) -> SwitcherResult<Option<ArtifactBody>> {
        let result = self.fetcher.fetch_stream(url).await;
        let outcome = match &result {
            Ok(Some(_)) => "ok",
            Ok(None) => "empty",
            Err(err) => err.category().as_str(),
        };
        record_upstream_fetch(DeliveryMode::Stream.as_str(), outcome);
        result
    }

    async fn fetch_text(&self, mode: DeliveryMode, url: &ArtifactUrl) -> SwitcherResult<String> {
        let result = self.fetcher.fetch_text(url).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.category().as_str(),
        };
        record_upstream_fetch(mode.as_str(), outcome);
        result
    }

    async fn cached(&self, env: &EnvName, url: ArtifactUrl) -> SwitcherResult<String> {
        if let Some(text) = self.cache.get(env) {
            record_cache_lookup(true);
            if self.refresh_on_hit {
                self.spawn_refresh(env.clone(), url);
            }
            return Ok(text);
        }
        record_cache_lookup(false);

        let lock = self.fill_lock(env);
        let _guard = lock.lock().await;

        // Another request may have filled the entry while we waited.
        if let Some(text) = self.cache.peek(env) {
            return Ok(text);
        }

        let text = self.fetch_text(DeliveryMode::Cache, &url).await?;
        self.cache.set(env, text.clone());
        tracing::debug!(env = %env, bytes = text.len(), "cache filled");
        Ok(text)
    }

    fn fill_lock(&self, env: &EnvName) -> Arc<Mutex<()>> {
        self.fills.entry(env.clone()).or_default().clone()
    }

    fn spawn_refresh(&self, env: EnvName, url: ArtifactUrl) {
        let Ok(guard) = self.fill_lock(&env).try_lock_owned() else {
            tracing::debug!(env = %env, "cache refresh already in flight");
            return;
        };

        let fetcher = Arc::clone(&self.fetcher);
        let cache = Arc::clone(&self.cache);

        tokio::spawn(async move {
            let _guard = guard;
            let result = fetcher.fetch_text(&url).await;
            match result {
                Ok(text) => {
                    record_upstream_fetch(DeliveryMode::Cache.as_str(), "ok");
                    cache.set(&env, text);
                    tracing::debug!(env = %env, "cache refreshed");
                }
                Err(err) => {
                    record_upstream_fetch(DeliveryMode::Cache.as_str(), err.category().as_str());
                    tracing::warn!(env = %env, error = %err, "cache refresh failed");
                }
            }
        });
    }
}

impl std::fmt::Debug for DeliveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("refresh_on_hit", &self.refresh_on_hit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;
    use switcher_core::{
        Binding, BoxFuture, CacheConfig, ErrorCategory, MemoryCache, MemoryStore,
    };

    /// Serves fixed text, or fails while `failing` is set, and counts calls.
    struct CountingFetcher {
        text: &'static str,
        delay: Duration,
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new(text: &'static str) -> Self {
            Self {
                text,
                delay: Duration::ZERO,
                failing: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(text: &'static str) -> Self {
            let fetcher = Self::new(text);
            fetcher.failing.store(true, Ordering::SeqCst);
            fetcher
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetcher for CountingFetcher {
        fn fetch_stream<'a>(
            &'a self,
            _url: &'a ArtifactUrl,
        ) -> BoxFuture<'a, SwitcherResult<Option<ArtifactBody>>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(ArtifactBody::from_chunks(vec![Bytes::from(self.text)])))
            })
        }

        fn fetch_text<'a>(&'a self, url: &'a ArtifactUrl) -> BoxFuture<'a, SwitcherResult<String>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                if self.failing.load(Ordering::SeqCst) {
                    return Err(SwitcherError::upstream(url.as_str(), "connection refused"));
                }
                Ok(self.text.to_string())
            })
        }
    }

    fn prod() -> EnvName {
        EnvName::new("prod").unwrap()
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_bindings([Binding {
            env: prod(),
            url: "https://example.com/a.html".to_string(),
        }]))
    }

    #[tokio::test]
    async fn test_resolution_failure_skips_fetch() {
        let fetcher = Arc::new(CountingFetcher::new("x"));
        let cache = Arc::new(MemoryCache::new(CacheConfig::unbounded()));
        let engine = DeliveryEngine::new(store(), fetcher.clone(), cache, false);

        for mode in [DeliveryMode::Stream, DeliveryMode::Cache, DeliveryMode::Hydrate] {
            let err = engine
                .deliver(None, mode, &HydrationPayload::new())
                .await
                .unwrap_err();
            assert_eq!(err.category(), ErrorCategory::ConfigurationDefect);

            let staging = EnvName::new("staging").unwrap();
            let err = engine
                .deliver(Some(&staging), mode, &HydrationPayload::new())
                .await
                .unwrap_err();
            assert_eq!(err.category(), ErrorCategory::UnboundEnvironment);
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_defer_does_not_fetch() {
        let fetcher = Arc::new(CountingFetcher::new("x"));
        let cache = Arc::new(MemoryCache::new(CacheConfig::unbounded()));
        let engine = DeliveryEngine::new(store(), fetcher.clone(), cache, false);

        let delivery = engine
            .deliver(Some(&prod()), DeliveryMode::Defer, &HydrationPayload::new())
            .await
            .unwrap();
        match delivery {
            Delivery::Deferred(url) => assert_eq!(url.as_str(), "https://example.com/a.html"),
            other => panic!("expected deferred delivery, got {other:?}"),
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_without_refresh_fetches_once() {
        let fetcher = Arc::new(CountingFetcher::new("<html>v1</html>"));
        let cache = Arc::new(MemoryCache::new(CacheConfig::unbounded()));
        let engine = DeliveryEngine::new(store(), fetcher.clone(), cache.clone(), false);
        let payload = HydrationPayload::new();

        for _ in 0..3 {
            let delivery = engine
                .deliver(Some(&prod()), DeliveryMode::Cache, &payload)
                .await
                .unwrap();
            assert!(matches!(delivery, Delivery::Text(ref t) if t == "<html>v1</html>"));
        }
        assert_eq!(fetcher.calls(), 1);
        assert!(cache.contains(&prod()));
    }

    #[tokio::test]
    async fn test_cache_hit_refreshes_in_background() {
        let fetcher = Arc::new(CountingFetcher::new("<html>fresh</html>"));
        let cache = Arc::new(MemoryCache::new(CacheConfig::unbounded()));
        cache.set(&prod(), "<html>stale</html>".to_string());
        let engine = DeliveryEngine::new(store(), fetcher.clone(), cache.clone(), true);

        let delivery = engine
            .deliver(Some(&prod()), DeliveryMode::Cache, &HydrationPayload::new())
            .await
            .unwrap();
        assert!(matches!(delivery, Delivery::Text(ref t) if t == "<html>stale</html>"));

        for _ in 0..50 {
            if fetcher.calls() == 1 && cache.get(&prod()).as_deref() == Some("<html>fresh</html>") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("background refresh did not update the cache");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_fetch_once() {
        let fetcher = Arc::new(CountingFetcher {
            delay: Duration::from_millis(50),
            ..CountingFetcher::new("<html>once</html>")
        });
        let cache = Arc::new(MemoryCache::new(CacheConfig::unbounded()));
        let engine = Arc::new(DeliveryEngine::new(store(), fetcher.clone(), cache.clone(), false));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .deliver(Some(&prod()), DeliveryMode::Cache, &HydrationPayload::new())
                    .await
            }));
        }
        for handle in handles {
            let delivery = handle.await.unwrap().unwrap();
            assert!(matches!(delivery, Delivery::Text(ref t) if t == "<html>once</html>"));
        }
        assert_eq!(fetcher.calls(), 1);

        // Waiters re-check without being counted twice.
        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 8);
        assert!(stats.misses >= 1);
    }

    #[tokio::test]
    async fn test_cache_miss_fetch_failure_leaves_no_entry() {
        let fetcher = Arc::new(CountingFetcher::failing("<html>v1</html>"));
        let cache = Arc::new(MemoryCache::new(CacheConfig::unbounded()));
        let engine = DeliveryEngine::new(store(), fetcher.clone(), cache.clone(), false);

        let err = engine
            .deliver(Some(&prod()), DeliveryMode::Cache, &HydrationPayload::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::UpstreamFetchFailure);
        assert!(!cache.contains(&prod()));

        fetcher.failing.store(false, Ordering::SeqCst);
        let delivery = engine
            .deliver(Some(&prod()), DeliveryMode::Cache, &HydrationPayload::new())
            .await
            .unwrap();
        assert!(matches!(delivery, Delivery::Text(ref t) if t == "<html>v1</html>"));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_entry() {
        let fetcher = Arc::new(CountingFetcher::failing("<html>fresh</html>"));
        let cache = Arc::new(MemoryCache::new(CacheConfig::unbounded()));
        cache.set(&prod(), "<html>stale</html>".to_string());
        let engine = DeliveryEngine::new(store(), fetcher.clone(), cache.clone(), true);

        let delivery = engine
            .deliver(Some(&prod()), DeliveryMode::Cache, &HydrationPayload::new())
            .await
            .unwrap();
        assert!(matches!(delivery, Delivery::Text(ref t) if t == "<html>stale</html>"));

        for _ in 0..50 {
            if fetcher.calls() == 1 && engine.fill_lock(&prod()).try_lock().is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.peek(&prod()).as_deref(), Some("<html>stale</html>"));
    }

    #[tokio::test]
    async fn test_hydrate_does_not_cache() {
        let fetcher = Arc::new(CountingFetcher::new("<html>{{HYDRATION_STATE}}</html>"));
        let cache = Arc::new(MemoryCache::new(CacheConfig::unbounded()));
        let engine = DeliveryEngine::new(store(), fetcher, cache.clone(), false);
        let payload = HydrationPayload::new().with("hydrated", "yes");

        let delivery = engine
            .deliver(Some(&prod()), DeliveryMode::Hydrate, &payload)
            .await
            .unwrap();
        assert!(
            matches!(delivery, Delivery::Text(ref t) if t == r#"<html>{"hydrated":"yes"}</html>"#)
        );
        assert!(!cache.contains(&prod()));
    }
}
