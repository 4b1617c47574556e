//! # Switcher Fetch
//!
//! The reqwest-backed [`Fetcher`] used to pull artifacts from their bound URLs.

#![doc(html_root_url = "https://docs.rs/switcher-fetch/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::time::Duration;

use futures_util::StreamExt;
use http::StatusCode;
use reqwest::{header, Client, RequestBuilder, Response};
use switcher_core::{ArtifactBody, ArtifactUrl, BoxFuture, Fetcher, SwitcherError, SwitcherResult};
use thiserror::Error;

/// Default user agent sent upstream.
pub const DEFAULT_USER_AGENT: &str = concat!("artifact-switcher/", env!("CARGO_PKG_VERSION"));

/// Errors building an [`HttpFetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The underlying HTTP client could not be constructed.
    #[error("failed to create http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Bounds connecting, each idle gap between body reads, whole buffered
    /// fetches, and the wait for response headers on streamed fetches.
    /// A streamed body is never cut off while bytes keep arriving.
    pub timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Idle connections kept per upstream host.
    pub pool_max_idle_per_host: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pool_max_idle_per_host: 32,
        }
    }
}

/// HTTP(S) artifact fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the TLS backend cannot initialize.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request(&self, url: &ArtifactUrl) -> RequestBuilder {
        self.client.get(url.as_url().clone())
    }

    async fn send(&self, url: &ArtifactUrl, request: RequestBuilder) -> SwitcherResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| SwitcherError::upstream(url.as_str(), format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_MODIFIED {
            return Err(SwitcherError::upstream(
                url.as_str(),
                format!("upstream returned {status}"),
            ));
        }

        tracing::debug!(url = %url, status = status.as_u16(), "upstream responded");
        Ok(response)
    }
}

/// Returns `true` when a successful upstream response carries nothing to stream.
fn has_no_body(response: &Response) -> bool {
    matches!(
        response.status(),
        StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED
    ) || response.content_length() == Some(0)
}

impl Fetcher for HttpFetcher {
    fn fetch_stream<'a>(
        &'a self,
        url: &'a ArtifactUrl,
    ) -> BoxFuture<'a, SwitcherResult<Option<ArtifactBody>>> {
        Box::pin(async move {
            let response = tokio::time::timeout(self.timeout, self.send(url, self.request(url)))
                .await
                .map_err(|_| {
                    SwitcherError::upstream(
                        url.as_str(),
                        format!("no response within {:?}", self.timeout),
                    )
                })??;
            if has_no_body(&response) {
                return Ok(None);
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let content_length = response.content_length();

            let source = url.to_string();
            let stream = response
                .bytes_stream()
                .map(move |chunk| {
                    chunk.map_err(|e| {
                        SwitcherError::upstream(source.as_str(), format!("stream interrupted: {e}"))
                    })
                })
                .boxed();

            Ok(Some(ArtifactBody {
                content_type,
                content_length,
                stream,
            }))
        })
    }

    fn fetch_text<'a>(&'a self, url: &'a ArtifactUrl) -> BoxFuture<'a, SwitcherResult<String>> {
        Box::pin(async move {
            let request = self.request(url).timeout(self.timeout);
            let response = self.send(url, request).await?;
            response.text().await.map_err(|e| {
                SwitcherError::upstream(url.as_str(), format!("failed to read body: {e}"))
            })
        })
    }
}
