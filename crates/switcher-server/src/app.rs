//! Assembles stores, the delivery engine and per-route pipelines from a
//! [`SwitcherConfig`].

use std::sync::Arc;

use http::{HeaderName, Method};
use switcher_core::{
    Binding, ContentCache, DeliveryMode, EnvName, Fetcher, MemoryCache, MemoryStore,
    StorageDriver,
};
use switcher_fetch::HttpFetcher;
use switcher_middleware::stages::{
    DeliveryMiddleware, EnvTargetMiddleware, RedirectMiddleware, RequestIdMiddleware,
    UpdateMiddleware,
};
use switcher_middleware::{BoxedMiddleware, DeliveryEngine, Pipeline};

use crate::config::{RouteConfig, SwitcherConfig, UPDATE_PATH};
use crate::error::{ConfigError, ServerResult};
use crate::router::Router;

/// Everything the server needs to answer requests.
#[derive(Clone)]
pub struct App {
    router: Router,
    store: Arc<dyn StorageDriver>,
    engine: Arc<DeliveryEngine>,
}

impl App {
    /// Builds the production app: an in-memory store seeded from
    /// `config.bindings`, an in-memory cache and the HTTP fetcher.
    pub fn from_config(config: &SwitcherConfig) -> ServerResult<Self> {
        let store = Arc::new(MemoryStore::with_bindings(seed_bindings(config)?));
        let cache = Arc::new(MemoryCache::new(config.cache_config()));
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch_config())?);
        Self::with_parts(config, store, fetcher, cache)
    }

    /// Builds the app over caller-supplied capabilities.
    ///
    /// `config.bindings` is not applied; seed `store` directly.
    pub fn with_parts(
        config: &SwitcherConfig,
        store: Arc<dyn StorageDriver>,
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<dyn ContentCache>,
    ) -> ServerResult<Self> {
        let engine = Arc::new(DeliveryEngine::new(
            Arc::clone(&store),
            fetcher,
            cache,
            config.cache.refresh_on_hit,
        ));

        let request_id: BoxedMiddleware = if config.server.trust_request_id {
            Arc::new(RequestIdMiddleware::trust_incoming())
        } else {
            Arc::new(RequestIdMiddleware::new())
        };

        let mut router = Router::new();
        router.add_route(
            Method::POST,
            UPDATE_PATH,
            Pipeline::builder()
                .shared_stage(Arc::clone(&request_id))
                .stage(UpdateMiddleware::new(Arc::clone(&store)))
                .build(),
        );

        for route in &config.routes {
            let pipeline = delivery_pipeline(route, &engine, Arc::clone(&request_id))?;
            if !router.add_route(Method::GET, route.path.as_str(), pipeline) {
                return Err(ConfigError::invalid(format!(
                    "duplicate route path {}",
                    route.path
                ))
                .into());
            }
        }

        tracing::debug!(routes = router.len(), "routes registered");

        Ok(Self {
            router,
            store,
            engine,
        })
    }

    /// Returns the route table.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the binding store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StorageDriver> {
        &self.store
    }

    /// Returns the shared delivery engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<DeliveryEngine> {
        &self.engine
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("router", &self.router)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

fn seed_bindings(config: &SwitcherConfig) -> ServerResult<Vec<Binding>> {
    config
        .bindings
        .iter()
        .map(|(env, url)| {
            let env = EnvName::new(env.as_str())
                .ok_or_else(|| ConfigError::invalid("binding names must be non-empty"))?;
            Ok(Binding {
                env,
                url: url.clone(),
            })
        })
        .collect()
}

fn delivery_pipeline(
    route: &RouteConfig,
    engine: &Arc<DeliveryEngine>,
    request_id: BoxedMiddleware,
) -> ServerResult<Pipeline> {
    let env = route
        .env_name()
        .ok_or_else(|| ConfigError::invalid(format!("route {} has an empty env", route.path)))?;

    let env_target = match &route.env_header {
        Some(header) => {
            let name = HeaderName::try_from(header.as_str()).map_err(|e| {
                ConfigError::invalid(format!("route {} env_header: {e}", route.path))
            })?;
            EnvTargetMiddleware::from_header(name, Some(env))
        }
        None => EnvTargetMiddleware::fixed(env),
    };

    let mut builder = Pipeline::builder()
        .shared_stage(request_id)
        .stage(env_target)
        .stage(
            DeliveryMiddleware::new(Arc::clone(engine), route.mode)
                .with_payload(route.hydration.clone()),
        );
    if route.mode == DeliveryMode::Defer {
        builder = builder.stage(RedirectMiddleware::new());
    }

    Ok(builder.build())
}
