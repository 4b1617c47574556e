//! # Switcher Middleware
//!
//! Request pipelines for the artifact switcher.
//!
//! Each route owns a [`Pipeline`]: an ordered list of stages, each returning
//! an [`Outcome`] (respond, pass to the next stage, or fail). The runner
//! turns failures into their fixed client responses.
//!
//! ```text
//! GET  /         → request_id → env_target → delivery(stream)
//! GET  /redirect → request_id → env_target → delivery(defer) → redirect
//! POST /api/set-new-version → request_id → update
//! ```
//!
//! The [`DeliveryEngine`] holds the resolver, fetcher, and content cache
//! shared by every delivery route.

#![doc(html_root_url = "https://docs.rs/switcher-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod engine;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod types;

pub use context::MiddlewareContext;
pub use engine::{Delivery, DeliveryEngine};
pub use middleware::{BoxFuture, FnMiddleware, Middleware, Outcome};
pub use pipeline::{BoxedMiddleware, Pipeline, PipelineBuilder, REQUEST_ID_HEADER};
pub use types::{
    collect_body, error_response, json_response, text_response, Body, BoxError, Request,
    Response, DONE_MESSAGE, NOT_FOUND_MESSAGE,
};
