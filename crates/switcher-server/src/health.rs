//! Liveness endpoint.
//!
//! `GET /health` answers with the service version and uptime while the
//! process is serving.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Body of a `/health` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// `"healthy"` while the server is accepting requests.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Seconds since the server started.
    pub uptime_seconds: u64,
}

impl HealthStatus {
    /// A healthy status.
    #[must_use]
    pub fn healthy(version: impl Into<String>, uptime: Duration) -> Self {
        Self {
            status: "healthy".to_string(),
            version: version.into(),
            uptime_seconds: uptime.as_secs(),
        }
    }

    /// Returns whether the status is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Tracks uptime for the health endpoint.
///
/// # Example
///
/// ```rust
/// use switcher_server::HealthCheck;
///
/// let health = HealthCheck::new("0.1.0");
/// let status = health.status();
/// assert!(status.is_healthy());
/// assert_eq!(status.version, "0.1.0");
/// ```
#[derive(Debug, Clone)]
pub struct HealthCheck {
    version: String,
    started_at: Instant,
}

impl HealthCheck {
    /// Starts the uptime clock.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            started_at: Instant::now(),
        }
    }

    /// Returns the uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus::healthy(&self.version, self.uptime())
    }

    /// Returns the status as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.status())
            .unwrap_or_else(|_| r#"{"status":"healthy"}"#.to_string())
    }
}
