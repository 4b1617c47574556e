//! Delivery stage: runs the [`DeliveryEngine`] for one route.

use std::sync::Arc;

use http::StatusCode;
use switcher_core::{DeliveryMode, HydrationPayload};

use crate::context::MiddlewareContext;
use crate::engine::{Delivery, DeliveryEngine};
use crate::middleware::{BoxFuture, Middleware, Outcome};
use crate::types::{artifact_response, stream_response, text_response, Request, NOT_FOUND_MESSAGE};

/// Delivers the context's environment in a fixed mode.
///
/// DEFER attaches the resolved URL to the context and passes to the next
/// stage. Every other mode responds.
#[derive(Debug, Clone)]
pub struct DeliveryMiddleware {
    engine: Arc<DeliveryEngine>,
    mode: DeliveryMode,
    payload: HydrationPayload,
}

impl DeliveryMiddleware {
    /// Creates a stage delivering in `mode`.
    #[must_use]
    pub fn new(engine: Arc<DeliveryEngine>, mode: DeliveryMode) -> Self {
        Self {
            engine,
            mode,
            payload: HydrationPayload::new(),
        }
    }

    /// Sets the data substituted in HYDRATE mode.
    #[must_use]
    pub fn with_payload(mut self, payload: HydrationPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Returns the configured mode.
    #[must_use]
    pub const fn mode(&self) -> DeliveryMode {
        self.mode
    }
}

impl Middleware for DeliveryMiddleware {
    fn name(&self) -> &'static str {
        "delivery"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        _request: &'a Request,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let delivery = self
                .engine
                .deliver(ctx.env_to_serve(), self.mode, &self.payload)
                .await;

            match delivery {
                Ok(Delivery::Deferred(url)) => {
                    ctx.set_artifact_url(url);
                    Outcome::Next
                }
                Ok(Delivery::Stream(Some(body))) => Outcome::Respond(stream_response(body)),
                Ok(Delivery::Stream(None)) => {
                    Outcome::Respond(text_response(StatusCode::OK, NOT_FOUND_MESSAGE))
                }
                Ok(Delivery::Text(text)) => Outcome::Respond(artifact_response(text)),
                Err(err) => Outcome::Fail(err),
            }
        })
    }
}
