//! Explicit pipeline runner.
//!
//! Stages run in insertion order. The first stage to respond or fail ends the
//! request. If every stage passes, the pipeline answers
//! `404 "requested resource not found"`.

use std::sync::Arc;

use http::header::HeaderValue;
use http::StatusCode;

use crate::context::MiddlewareContext;
use crate::middleware::{Middleware, Outcome};
use crate::types::{error_response, text_response, Request, Response, NOT_FOUND_MESSAGE};

/// Header carrying the request ID on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A type-erased stage.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An ordered, immutable list of stages.
///
/// # Example
///
/// ```
/// use switcher_middleware::{FnMiddleware, Outcome, Pipeline};
///
/// let pipeline = Pipeline::builder()
///     .stage(FnMiddleware::new("noop", |_ctx, _req| Outcome::Next))
///     .build();
/// assert_eq!(pipeline.stage_names(), vec!["noop"]);
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs `request` through every stage until one responds or fails.
    pub async fn process(&self, mut ctx: MiddlewareContext, request: &Request) -> Response {
        let mut response = self.run_stages(&mut ctx, request).await;

        if let Ok(value) = HeaderValue::from_str(&ctx.request_id().to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }

    async fn run_stages(&self, ctx: &mut MiddlewareContext, request: &Request) -> Response {
        for stage in &self.stages {
            match stage.process(ctx, request).await {
                Outcome::Next => {}
                Outcome::Respond(response) => {
                    tracing::debug!(
                        stage = stage.name(),
                        status = response.status().as_u16(),
                        "stage responded"
                    );
                    return response;
                }
                Outcome::Fail(err) => {
                    let category = err.category();
                    if err.is_client_error() {
                        tracing::warn!(
                            stage = stage.name(),
                            error.category = %category,
                            error = %err,
                            "request rejected"
                        );
                    } else {
                        tracing::error!(
                            stage = stage.name(),
                            error.category = %category,
                            error = %err,
                            "request failed"
                        );
                    }
                    return error_response(&err);
                }
            }
        }

        tracing::debug!("no stage claimed the request");
        text_response(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn shared_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnMiddleware;
    use crate::types::collect_body;
    use bytes::Bytes;
    use switcher_core::SwitcherError;

    fn request() -> Request {
        Request::new(Bytes::new())
    }

    #[tokio::test]
    async fn test_first_response_wins() {
        let pipeline = Pipeline::builder()
            .stage(FnMiddleware::new("pass", |_ctx, _req| Outcome::Next))
            .stage(FnMiddleware::new("answer", |_ctx, _req| {
                Outcome::Respond(text_response(StatusCode::OK, "first"))
            }))
            .stage(FnMiddleware::new("never", |_ctx, _req| {
                Outcome::Respond(text_response(StatusCode::OK, "second"))
            }))
            .build();

        let response = pipeline.process(MiddlewareContext::new(), &request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(collect_body(response).await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_fail_renders_fixed_message() {
        let pipeline = Pipeline::builder()
            .stage(FnMiddleware::new("broken", |_ctx, _req| {
                Outcome::Fail(SwitcherError::ConfigurationDefect)
            }))
            .build();

        let response = pipeline.process(MiddlewareContext::new(), &request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            collect_body(response).await.unwrap(),
            "sorry, we couldn't handle your request"
        );
    }

    #[tokio::test]
    async fn test_exhausted_pipeline_is_not_found() {
        let pipeline = Pipeline::builder()
            .stage(FnMiddleware::new("pass", |_ctx, _req| Outcome::Next))
            .build();

        let response = pipeline.process(MiddlewareContext::new(), &request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            collect_body(response).await.unwrap(),
            "requested resource not found"
        );
    }

    #[tokio::test]
    async fn test_request_id_header_is_set() {
        let ctx = MiddlewareContext::new();
        let expected = ctx.request_id().to_string();

        let response = Pipeline::default().process(ctx, &request()).await;
        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            expected.as_str()
        );
    }

    #[test]
    fn test_stage_names() {
        let pipeline = Pipeline::builder()
            .stage(FnMiddleware::new("a", |_ctx, _req| Outcome::Next))
            .stage(FnMiddleware::new("b", |_ctx, _req| Outcome::Next))
            .build();
        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_shared_stage_serves_many_pipelines() {
        let shared: BoxedMiddleware = Arc::new(FnMiddleware::new("shared", |_ctx, _req| {
            Outcome::Respond(text_response(StatusCode::OK, "shared"))
        }));
        let first = Pipeline::builder().shared_stage(Arc::clone(&shared)).build();
        let second = Pipeline::builder().shared_stage(Arc::clone(&shared)).build();

        for pipeline in [first, second] {
            assert_eq!(pipeline.stage_names(), vec!["shared"]);
            let response = pipeline.process(MiddlewareContext::new(), &request()).await;
            assert_eq!(collect_body(response).await.unwrap(), "shared");
        }
        assert_eq!(Arc::strong_count(&shared), 1);
    }
}
