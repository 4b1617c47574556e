//! Request ID stage.
//!
//! Picks the request ID used in logs and echoed in the `x-request-id`
//! response header: a propagated one when the caller is trusted and sent a
//! valid UUID, otherwise the freshly generated one already on the context.

use switcher_core::RequestId;
use uuid::Uuid;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Outcome};
use crate::pipeline::REQUEST_ID_HEADER;
use crate::types::Request;

/// Adopts an incoming `x-request-id` when configured to trust it.
#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware {
    trust_incoming: bool,
}

impl RequestIdMiddleware {
    /// Always keeps the generated ID.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts valid incoming IDs.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
        }
    }

    fn extract_request_id(&self, request: &Request) -> Option<RequestId> {
        if !self.trust_incoming {
            return None;
        }

        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(RequestId::from_uuid)
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: &'a Request,
    ) -> BoxFuture<'a, Outcome> {
        if let Some(request_id) = self.extract_request_id(request) {
            ctx.set_request_id(request_id);
        }
        Box::pin(async { Outcome::Next })
    }
}
