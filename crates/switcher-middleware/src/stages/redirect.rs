//! Redirect stage: a consumer of DEFER deliveries.

use http::header::{HeaderValue, LOCATION};
use http::StatusCode;
use switcher_core::SwitcherError;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Outcome};
use crate::types::{empty, Request, Response};

/// Answers `307 Temporary Redirect` to the URL a DEFER stage attached.
///
/// Passes when no URL is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectMiddleware;

impl RedirectMiddleware {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for RedirectMiddleware {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        _request: &'a Request,
    ) -> BoxFuture<'a, Outcome> {
        let outcome = match ctx.artifact_url() {
            None => Outcome::Next,
            Some(url) => match HeaderValue::from_str(url.as_str()) {
                Ok(location) => {
                    let mut response = Response::new(empty());
                    *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
                    response.headers_mut().insert(LOCATION, location);
                    Outcome::Respond(response)
                }
                Err(e) => Outcome::Fail(SwitcherError::malformed_binding(
                    ctx.env_to_serve().map(ToString::to_string).unwrap_or_default(),
                    url.as_str(),
                    e.to_string(),
                )),
            },
        };
        Box::pin(async { outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use switcher_core::ArtifactUrl;

    #[tokio::test]
    async fn test_redirects_to_attached_url() {
        let mut ctx = MiddlewareContext::new();
        ctx.set_artifact_url(ArtifactUrl::parse("https://example.com/a.html").unwrap());

        let outcome = RedirectMiddleware::new()
            .process(&mut ctx, &Request::new(Bytes::new()))
            .await;

        let Outcome::Respond(response) = outcome else {
            panic!("expected a redirect");
        };
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "https://example.com/a.html"
        );
    }

    #[tokio::test]
    async fn test_passes_without_url() {
        let mut ctx = MiddlewareContext::new();
        let outcome = RedirectMiddleware::new()
            .process(&mut ctx, &Request::new(Bytes::new()))
            .await;
        assert!(matches!(outcome, Outcome::Next));
    }
}
