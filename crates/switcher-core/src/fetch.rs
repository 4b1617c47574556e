//! Remote artifact retrieval capability.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::error::{SwitcherError, SwitcherResult};
use crate::types::ArtifactUrl;
use crate::BoxFuture;

/// A stream of body chunks as they arrive from upstream.
pub type ByteStream = BoxStream<'static, Result<Bytes, SwitcherError>>;

/// A streamable artifact body plus the upstream metadata worth forwarding.
pub struct ArtifactBody {
    /// Upstream `Content-Type`, if declared.
    pub content_type: Option<String>,
    /// Upstream `Content-Length`, if declared.
    pub content_length: Option<u64>,
    /// The body chunks.
    pub stream: ByteStream,
}

impl ArtifactBody {
    /// Wraps an existing chunk stream.
    #[must_use]
    pub fn new(stream: ByteStream) -> Self {
        Self {
            content_type: None,
            content_length: None,
            stream,
        }
    }

    /// Builds a body from in-memory chunks.
    #[must_use]
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl std::fmt::Debug for ArtifactBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Fetches artifact content from a resolved URL.
///
/// `fetch_stream` returns `Ok(None)` when the upstream answered successfully
/// but has no body to stream. Transport failures and non-success statuses are
/// [`SwitcherError::UpstreamFetchFailure`].
pub trait Fetcher: Send + Sync + 'static {
    /// Fetches the artifact as a live byte stream.
    fn fetch_stream<'a>(
        &'a self,
        url: &'a ArtifactUrl,
    ) -> BoxFuture<'a, SwitcherResult<Option<ArtifactBody>>>;

    /// Fetches the artifact as fully buffered text.
    fn fetch_text<'a>(&'a self, url: &'a ArtifactUrl) -> BoxFuture<'a, SwitcherResult<String>>;
}
