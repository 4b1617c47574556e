//! Exact-match routing from `(method, path)` to a prebuilt [`Pipeline`].
//!
//! ```rust
//! use http::Method;
//! use switcher_middleware::Pipeline;
//! use switcher_server::Router;
//!
//! let mut router = Router::new();
//! router.add_route(Method::GET, "/", Pipeline::default());
//!
//! assert!(router.match_route(&Method::GET, "/").is_some());
//! assert!(router.match_route(&Method::GET, "/other").is_none());
//! assert!(router.match_route(&Method::POST, "/").is_none());
//! ```

use std::collections::HashMap;

use http::Method;
use switcher_middleware::Pipeline;

/// A registered route.
#[derive(Debug, Clone)]
pub struct Route {
    path: String,
    pipeline: Pipeline,
}

impl Route {
    /// Returns the registered path, used as the metrics label.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the pipeline serving this route.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

/// Route table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: HashMap<(Method, String), Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pipeline` for `method` and `path`.
    ///
    /// Returns `false`, leaving the existing route in place, if the pair is
    /// already registered.
    pub fn add_route(
        &mut self,
        method: Method,
        path: impl Into<String>,
        pipeline: Pipeline,
    ) -> bool {
        let path = path.into();
        let key = (method, path.clone());
        if self.routes.contains_key(&key) {
            return false;
        }
        self.routes.insert(key, Route { path, pipeline });
        true
    }

    /// Finds the route for `method` and `path`. Query strings are not part
    /// of `path`.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<&Route> {
        self.routes.get(&(method.clone(), path.to_string()))
    }

    /// Returns all registered `(method, path)` pairs, sorted by path.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, &str)> {
        let mut routes: Vec<_> = self
            .routes
            .iter()
            .map(|((method, _), route)| (method.clone(), route.path()))
            .collect();
        routes.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        routes
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
