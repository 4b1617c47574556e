//! The stage trait and its result type.
//!
//! A stage never calls the next one itself. It returns an [`Outcome`] and the
//! [`Pipeline`](crate::Pipeline) decides what runs next.
//!
//! # Example
//!
//! ```
//! use switcher_middleware::{BoxFuture, Middleware, MiddlewareContext, Outcome, Request};
//!
//! struct Deny;
//!
//! impl Middleware for Deny {
//!     fn name(&self) -> &'static str {
//!         "deny"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         _ctx: &'a mut MiddlewareContext,
//!         _request: &'a Request,
//!     ) -> BoxFuture<'a, Outcome> {
//!         Box::pin(async { Outcome::Fail(switcher_core::SwitcherError::validation("denied")) })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::types::{Request, Response};
pub use switcher_core::BoxFuture;
use switcher_core::SwitcherError;

/// What a stage decided.
#[derive(Debug)]
pub enum Outcome {
    /// Send this response; later stages do not run.
    Respond(Response),
    /// Hand over to the next stage.
    Next,
    /// Stop with an error; the pipeline renders its fixed client response.
    Fail(SwitcherError),
}

/// A pipeline stage.
pub trait Middleware: Send + Sync + 'static {
    /// Stage name used in logs.
    fn name(&self) -> &'static str;

    /// Runs the stage.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: &'a Request,
    ) -> BoxFuture<'a, Outcome>;
}

/// A stage built from a synchronous function.
///
/// # Example
///
/// ```
/// use switcher_middleware::{FnMiddleware, Outcome};
///
/// let passthrough = FnMiddleware::new("passthrough", |_ctx, _req| Outcome::Next);
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: Fn(&mut MiddlewareContext, &Request) -> Outcome + Send + Sync + 'static,
{
    /// Creates a new function-based stage.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut MiddlewareContext, &Request) -> Outcome + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: &'a Request,
    ) -> BoxFuture<'a, Outcome> {
        let outcome = (self.func)(ctx, request);
        Box::pin(async move { outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use switcher_core::EnvName;

    #[tokio::test]
    async fn test_fn_middleware() {
        let mw = FnMiddleware::new("tag", |ctx: &mut MiddlewareContext, _req: &Request| {
            if let Some(env) = EnvName::new("prod") {
                ctx.set_env_to_serve(env);
            }
            Outcome::Next
        });
        assert_eq!(mw.name(), "tag");

        let mut ctx = MiddlewareContext::new();
        let request = Request::new(Bytes::new());
        let outcome = mw.process(&mut ctx, &request).await;

        assert!(matches!(outcome, Outcome::Next));
        assert_eq!(ctx.env_to_serve().map(EnvName::as_str), Some("prod"));
    }
}
