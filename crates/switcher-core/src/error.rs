//! Error types for the artifact switcher.
//!
//! [`SwitcherError`] is the single error type flowing out of resolution,
//! delivery, and binding updates. Every variant maps to a fixed
//! status/message pair for clients through [`SwitcherError::status_code`]
//! and [`SwitcherError::public_message`]; the `Display` output carries the
//! internal detail and is meant for logs only.
//!
//! | Category | Status | Client message |
//! |---|---|---|
//! | `configuration_defect` | 500 | `sorry, we couldn't handle your request` |
//! | `unbound_environment` | 500 | `sorry, we couldn't handle your request` |
//! | `malformed_binding` | 500 | `sorry, we couldn't handle your request` |
//! | `validation_failure` | 403 | `bad request shape` |
//! | `store_write_failure` | 500 | `sorry, we couldn't handle your request` |
//! | `upstream_fetch_failure` | 502 | `sorry, we couldn't handle your request` |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`SwitcherError`].
pub type SwitcherResult<T> = Result<T, SwitcherError>;

/// Client-visible body for every server-side failure.
pub const GENERIC_FAILURE_MESSAGE: &str = "sorry, we couldn't handle your request";

/// Client-visible body for a rejected write payload.
pub const BAD_REQUEST_SHAPE_MESSAGE: &str = "bad request shape";

/// Categories of errors for classification, logging, and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// No environment name was supplied to the delivery engine.
    ConfigurationDefect,
    /// The environment has no bound URL.
    UnboundEnvironment,
    /// The bound URL could not be parsed.
    MalformedBinding,
    /// A write payload is missing required fields.
    ValidationFailure,
    /// The storage driver refused a write.
    StoreWriteFailure,
    /// The remote artifact could not be retrieved.
    UpstreamFetchFailure,
}

impl ErrorCategory {
    /// Returns the HTTP status code for this category.
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::ValidationFailure => StatusCode::FORBIDDEN,
            Self::UpstreamFetchFailure => StatusCode::BAD_GATEWAY,
            Self::ConfigurationDefect
            | Self::UnboundEnvironment
            | Self::MalformedBinding
            | Self::StoreWriteFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigurationDefect => "configuration_defect",
            Self::UnboundEnvironment => "unbound_environment",
            Self::MalformedBinding => "malformed_binding",
            Self::ValidationFailure => "validation_failure",
            Self::StoreWriteFailure => "store_write_failure",
            Self::UpstreamFetchFailure => "upstream_fetch_failure",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard error type for the artifact switcher.
///
/// # Example
///
/// ```
/// use switcher_core::{ErrorCategory, SwitcherError};
///
/// let err = SwitcherError::unbound("staging");
/// assert_eq!(err.category(), ErrorCategory::UnboundEnvironment);
/// assert_eq!(err.status_code().as_u16(), 500);
/// assert_eq!(err.public_message(), "sorry, we couldn't handle your request");
/// ```
#[derive(Error, Debug)]
pub enum SwitcherError {
    /// The surrounding application never chose an environment to serve.
    #[error("no env set")]
    ConfigurationDefect,

    /// The environment has no binding in the store.
    #[error("no values returned from db for env '{env}'")]
    UnboundEnvironment {
        /// The environment that was looked up.
        env: String,
    },

    /// The environment is bound to something that is not a URL.
    #[error("binding for env '{env}' is not a valid URL ({url}): {reason}")]
    MalformedBinding {
        /// The environment that was looked up.
        env: String,
        /// The raw stored value.
        url: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The write payload is missing a field or a field is empty.
    #[error("no request values set: {reason}")]
    ValidationFailure {
        /// Which check failed.
        reason: String,
    },

    /// The storage driver reported that the write did not persist.
    #[error("no values set to db for env '{env}'")]
    StoreWriteFailure {
        /// The environment whose binding was being written.
        env: String,
    },

    /// The remote artifact fetch failed or returned a non-success status.
    #[error("failed to fetch {url}: {message}")]
    UpstreamFetchFailure {
        /// The URL being fetched.
        url: String,
        /// Transport or status detail.
        message: String,
    },
}

impl SwitcherError {
    /// Creates an unbound-environment error.
    #[must_use]
    pub fn unbound(env: impl Into<String>) -> Self {
        Self::UnboundEnvironment { env: env.into() }
    }

    /// Creates a malformed-binding error.
    #[must_use]
    pub fn malformed_binding(
        env: impl Into<String>,
        url: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedBinding {
            env: env.into(),
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::ValidationFailure {
            reason: reason.into(),
        }
    }

    /// Creates a store write error.
    #[must_use]
    pub fn store_write(env: impl Into<String>) -> Self {
        Self::StoreWriteFailure { env: env.into() }
    }

    /// Creates an upstream fetch error.
    #[must_use]
    pub fn upstream(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamFetchFailure {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationDefect => ErrorCategory::ConfigurationDefect,
            Self::UnboundEnvironment { .. } => ErrorCategory::UnboundEnvironment,
            Self::MalformedBinding { .. } => ErrorCategory::MalformedBinding,
            Self::ValidationFailure { .. } => ErrorCategory::ValidationFailure,
            Self::StoreWriteFailure { .. } => ErrorCategory::StoreWriteFailure,
            Self::UpstreamFetchFailure { .. } => ErrorCategory::UpstreamFetchFailure,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().status_code()
    }

    /// Returns the fixed string sent to clients.
    ///
    /// Never includes environment names, URLs, or any other internal detail.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::ValidationFailure { .. } => BAD_REQUEST_SHAPE_MESSAGE,
            _ => GENERIC_FAILURE_MESSAGE,
        }
    }

    /// Returns `true` for failures caused by the caller rather than the server.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}
