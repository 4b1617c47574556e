//! Binding update stage for `POST /api/set-new-version`.
//!
//! The body is `{"envTarget": "...", "bucketUrl": "..."}`. Both fields must
//! be present, strings, and non-empty; otherwise the store is never touched.

use std::sync::Arc;

use http::StatusCode;
use serde::Deserialize;
use switcher_core::{Binding, EnvName, StorageDriver, SwitcherError, SwitcherResult};
use switcher_telemetry::metrics::record_binding_update;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Outcome};
use crate::types::{text_response, Request, DONE_MESSAGE};

/// Wire shape of an update request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetVersionRequest {
    env_target: Option<String>,
    bucket_url: Option<String>,
}

/// Parses and validates an update body.
///
/// # Errors
///
/// [`SwitcherError::ValidationFailure`] if the body is not a JSON object with
/// non-empty string `envTarget` and `bucketUrl` fields.
///
/// # Example
///
/// ```
/// use switcher_middleware::stages::update::parse_update;
///
/// let binding = parse_update(br#"{"envTarget":"prod","bucketUrl":"https://example.com/a.html"}"#)
///     .unwrap();
/// assert_eq!(binding.env.as_str(), "prod");
///
/// assert!(parse_update(br#"{"envTarget":"prod"}"#).is_err());
/// ```
pub fn parse_update(body: &[u8]) -> SwitcherResult<Binding> {
    let request: SetVersionRequest = serde_json::from_slice(body)
        .map_err(|e| SwitcherError::validation(format!("body is not a valid update: {e}")))?;

    let env = request
        .env_target
        .and_then(EnvName::new)
        .ok_or_else(|| SwitcherError::validation("envTarget is missing or empty"))?;

    let url = request
        .bucket_url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| SwitcherError::validation("bucketUrl is missing or empty"))?;

    Ok(Binding { env, url })
}

/// Validates the body and writes the binding.
#[derive(Clone)]
pub struct UpdateMiddleware {
    store: Arc<dyn StorageDriver>,
}

impl UpdateMiddleware {
    /// Creates a stage writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StorageDriver>) -> Self {
        Self { store }
    }

    async fn apply(&self, body: &[u8]) -> SwitcherResult<Binding> {
        let binding = parse_update(body)?;
        if self.store.set(&binding.url, &binding.env).await {
            Ok(binding)
        } else {
            Err(SwitcherError::store_write(binding.env.as_str()))
        }
    }
}

impl std::fmt::Debug for UpdateMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for UpdateMiddleware {
    fn name(&self) -> &'static str {
        "update"
    }

    fn process<'a>(
        &'a self,
        _ctx: &'a mut MiddlewareContext,
        request: &'a Request,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            match self.apply(request.body()).await {
                Ok(binding) => {
                    record_binding_update("ok");
                    tracing::info!(env = %binding.env, url = %binding.url, "binding updated");
                    Outcome::Respond(text_response(StatusCode::OK, DONE_MESSAGE))
                }
                Err(err) => {
                    record_binding_update(err.category().as_str());
                    Outcome::Fail(err)
                }
            }
        })
    }
}
