//! # Switcher Core
//!
//! Core types and capabilities for the artifact switcher.
//!
//! - [`EnvName`], [`ArtifactUrl`], [`Binding`] - what gets resolved
//! - [`StorageDriver`] / [`MemoryStore`] - the binding table
//! - [`ContentCache`] / [`MemoryCache`] - cached artifact text per environment
//! - [`Resolver`] - environment name to URL, with distinct failure kinds
//! - [`Fetcher`] - remote retrieval as a stream or as text
//! - [`hydrate`] - `{{HYDRATION_STATE}}` substitution
//! - [`SwitcherError`] - the error taxonomy

#![doc(html_root_url = "https://docs.rs/switcher-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::future::Future;
use std::pin::Pin;

mod cache;
mod error;
mod fetch;
mod hydrate;
mod resolver;
mod store;
mod types;

pub use cache::{CacheConfig, CacheStats, ContentCache, MemoryCache};
pub use error::{
    ErrorCategory, SwitcherError, SwitcherResult, BAD_REQUEST_SHAPE_MESSAGE,
    GENERIC_FAILURE_MESSAGE,
};
pub use fetch::{ArtifactBody, ByteStream, Fetcher};
pub use hydrate::{hydrate, HYDRATION_MARKER};
pub use resolver::Resolver;
pub use store::{MemoryStore, StorageDriver};
pub use types::{ArtifactUrl, Binding, DeliveryMode, EnvName, HydrationPayload, RequestId};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
