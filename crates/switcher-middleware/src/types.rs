//! Request/response types used throughout the pipeline.
//!
//! Requests arrive with their body already collected. Responses carry a
//! boxed body so a stage can answer with either buffered text or a live
//! upstream stream.

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use switcher_core::{ArtifactBody, SwitcherError};

/// Type-erased error carried by response bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The response body type.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// The HTTP request type used in the pipeline.
pub type Request = http::Request<Bytes>;

/// The HTTP response type used in the pipeline.
pub type Response = http::Response<Body>;

/// Body sent when a stream-mode fetch has nothing to stream, or when no
/// stage produced a response.
pub const NOT_FOUND_MESSAGE: &str = "requested resource not found";

/// Body sent after a successful binding update.
pub const DONE_MESSAGE: &str = "done";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// Wraps buffered bytes as a [`Body`].
pub fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// An empty [`Body`].
#[must_use]
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn with_content_type(status: StatusCode, content_type: &'static str, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// A `text/plain` response.
pub fn text_response(status: StatusCode, text: impl Into<Bytes>) -> Response {
    with_content_type(status, TEXT_PLAIN, full(text))
}

/// An `application/json` response.
pub fn json_response(status: StatusCode, json: impl Into<Bytes>) -> Response {
    with_content_type(status, APPLICATION_JSON, full(json))
}

/// A `200 text/html` response carrying fetched artifact text.
pub fn artifact_response(text: impl Into<Bytes>) -> Response {
    with_content_type(StatusCode::OK, TEXT_HTML, full(text))
}

/// A `200` response piping `body` to the client chunk by chunk.
#[must_use]
pub fn stream_response(body: ArtifactBody) -> Response {
    let ArtifactBody {
        content_type,
        stream,
        ..
    } = body;

    let frames = stream
        .map_ok(Frame::data)
        .map_err(|e: SwitcherError| -> BoxError { Box::new(e) });
    let mut response = Response::new(StreamBody::new(frames).boxed_unsync());

    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

/// The fixed client response for `err`.
///
/// Only [`SwitcherError::public_message`] reaches the client.
#[must_use]
pub fn error_response(err: &SwitcherError) -> Response {
    text_response(err.status_code(), err.public_message())
}

/// Collects a response body into bytes.
///
/// # Errors
///
/// Returns the body's error if a chunk fails.
pub async fn collect_body(response: Response) -> Result<Bytes, BoxError> {
    Ok(response.into_body().collect().await?.to_bytes())
}
