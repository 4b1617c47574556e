//! Chooses which environment a delivery route serves.

use http::HeaderName;
use switcher_core::EnvName;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Outcome};
use crate::types::Request;

/// Where the environment name comes from.
#[derive(Debug, Clone)]
pub enum EnvSource {
    /// Always the same environment.
    Fixed(EnvName),
    /// A request header, with an optional fallback when it is absent or empty.
    Header {
        /// Header to read.
        name: HeaderName,
        /// Used when the header is missing.
        fallback: Option<EnvName>,
    },
}

/// Sets [`MiddlewareContext::env_to_serve`].
///
/// If no environment can be determined the context is left unset and the
/// delivery stage fails with a configuration defect.
#[derive(Debug, Clone)]
pub struct EnvTargetMiddleware {
    source: EnvSource,
}

impl EnvTargetMiddleware {
    /// Serves `env` on every request.
    #[must_use]
    pub fn fixed(env: EnvName) -> Self {
        Self {
            source: EnvSource::Fixed(env),
        }
    }

    /// Reads the environment from header `name`.
    #[must_use]
    pub fn from_header(name: HeaderName, fallback: Option<EnvName>) -> Self {
        Self {
            source: EnvSource::Header { name, fallback },
        }
    }

    fn select(&self, request: &Request) -> Option<EnvName> {
        match &self.source {
            EnvSource::Fixed(env) => Some(env.clone()),
            EnvSource::Header { name, fallback } => request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| EnvName::new(v.trim()))
                .or_else(|| fallback.clone()),
        }
    }
}

impl Middleware for EnvTargetMiddleware {
    fn name(&self) -> &'static str {
        "env_target"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: &'a Request,
    ) -> BoxFuture<'a, Outcome> {
        if let Some(env) = self.select(request) {
            ctx.set_env_to_serve(env);
        }
        Box::pin(async { Outcome::Next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn env(name: &str) -> EnvName {
        EnvName::new(name).unwrap()
    }

    fn request(header: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header("x-env-target", value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    async fn selected(mw: &EnvTargetMiddleware, req: &Request) -> Option<String> {
        let mut ctx = MiddlewareContext::new();
        mw.process(&mut ctx, req).await;
        ctx.env_to_serve().map(ToString::to_string)
    }

    #[tokio::test]
    async fn test_fixed() {
        let mw = EnvTargetMiddleware::fixed(env("prod"));
        assert_eq!(selected(&mw, &request(Some("staging"))).await.as_deref(), Some("prod"));
    }

    #[tokio::test]
    async fn test_header_with_fallback() {
        let name = HeaderName::from_static("x-env-target");
        let mw = EnvTargetMiddleware::from_header(name, Some(env("prod")));

        assert_eq!(selected(&mw, &request(Some("staging"))).await.as_deref(), Some("staging"));
        assert_eq!(selected(&mw, &request(None)).await.as_deref(), Some("prod"));
        assert_eq!(selected(&mw, &request(Some("  "))).await.as_deref(), Some("prod"));
    }

    #[tokio::test]
    async fn test_header_without_fallback_leaves_unset() {
        let name = HeaderName::from_static("x-env-target");
        let mw = EnvTargetMiddleware::from_header(name, None);
        assert!(selected(&mw, &request(None)).await.is_none());
    }
}
