//! Per-request pipeline state.
//!
//! [`MiddlewareContext`] is what stages hand to each other: the environment
//! chosen for this request and the URL a DEFER stage resolved.

use std::time::Instant;

use switcher_core::{ArtifactUrl, EnvName, RequestId};

/// Context that flows through the pipeline.
///
/// # Example
///
/// ```
/// use switcher_core::EnvName;
/// use switcher_middleware::MiddlewareContext;
///
/// let mut ctx = MiddlewareContext::new();
/// assert!(ctx.env_to_serve().is_none());
///
/// ctx.set_env_to_serve(EnvName::new("prod").unwrap());
/// assert_eq!(ctx.env_to_serve().map(EnvName::as_str), Some("prod"));
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    request_id: RequestId,

    /// Environment the delivery stage should serve.
    env_to_serve: Option<EnvName>,

    /// URL attached by a DEFER delivery for downstream stages.
    artifact_url: Option<ArtifactUrl>,

    started_at: Instant,
}

impl MiddlewareContext {
    /// Creates a context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a context with a specific request ID.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            env_to_serve: None,
            artifact_url: None,
            started_at: Instant::now(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Sets the request ID.
    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = request_id;
    }

    /// Returns the environment chosen for this request, if any.
    #[must_use]
    pub fn env_to_serve(&self) -> Option<&EnvName> {
        self.env_to_serve.as_ref()
    }

    /// Chooses the environment to serve.
    pub fn set_env_to_serve(&mut self, env: EnvName) {
        self.env_to_serve = Some(env);
    }

    /// Returns the URL attached by a DEFER delivery, if any.
    #[must_use]
    pub fn artifact_url(&self) -> Option<&ArtifactUrl> {
        self.artifact_url.as_ref()
    }

    /// Attaches a resolved URL.
    pub fn set_artifact_url(&mut self, url: ArtifactUrl) {
        self.artifact_url = Some(url);
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}
