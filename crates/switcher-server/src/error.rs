//! Error types for configuration loading and server startup.

use std::path::PathBuf;

use thiserror::Error;

/// Problems reading or validating a [`SwitcherConfig`](crate::SwitcherConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension is neither `toml` nor `json`.
    #[error("unsupported config format: {0:?}")]
    UnsupportedFormat(String),

    /// The file could not be parsed.
    #[error("invalid {format}: {message}")]
    Parse {
        /// `TOML` or `JSON`.
        format: &'static str,
        /// Parser message.
        message: String,
    },

    /// The configuration parsed but is inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Creates an [`ConfigError::Invalid`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The listen address could not be parsed or bound.
    #[error("bind error: {0}")]
    Bind(String),

    /// The upstream HTTP client could not be built.
    #[error(transparent)]
    Fetch(#[from] switcher_fetch::FetchError),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
