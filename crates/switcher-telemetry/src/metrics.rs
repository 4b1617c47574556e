//! Prometheus metrics.
//!
//! The recorder is installed once per process; [`render_metrics`] produces
//! the text served on `GET /metrics`. Recording functions are no-ops until
//! a recorder is installed.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `switcher_requests_total` | Counter | `route`, `status` |
//! | `switcher_request_duration_seconds` | Histogram | `route` |
//! | `switcher_cache_lookups_total` | Counter | `result` |
//! | `switcher_upstream_fetches_total` | Counter | `mode`, `outcome` |
//! | `switcher_binding_updates_total` | Counter | `outcome` |

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Total requests by route and status.
pub const REQUESTS_TOTAL: &str = "switcher_requests_total";
/// Request latency by route.
pub const REQUEST_DURATION_SECONDS: &str = "switcher_request_duration_seconds";
/// Content cache lookups by result.
pub const CACHE_LOOKUPS_TOTAL: &str = "switcher_cache_lookups_total";
/// Upstream fetches by delivery mode and outcome.
pub const UPSTREAM_FETCHES_TOTAL: &str = "switcher_upstream_fetches_total";
/// Binding writes by outcome.
pub const BINDING_UPDATES_TOTAL: &str = "switcher_binding_updates_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Histogram buckets for request duration.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 1ms .. 10s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// Calling this again after a successful install is a no-op.
///
/// # Errors
///
/// Returns [`TelemetryError::MetricsInit`] if the buckets are invalid or
/// another recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled || METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    Ok(())
}

/// Renders metrics in Prometheus text format, or `None` before [`init_metrics`].
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Total number of HTTP requests processed");
    describe_histogram!(REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(CACHE_LOOKUPS_TOTAL, "Content cache lookups by result");
    describe_counter!(
        UPSTREAM_FETCHES_TOTAL,
        "Artifact fetches from bound URLs by mode and outcome"
    );
    describe_counter!(BINDING_UPDATES_TOTAL, "Environment binding writes by outcome");
}

/// Records a completed request.
pub fn record_request(route: &str, status_code: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "route" => route.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(REQUEST_DURATION_SECONDS, "route" => route.to_string())
        .record(duration.as_secs_f64());
}

/// Records a content cache lookup.
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(CACHE_LOOKUPS_TOTAL, "result" => result).increment(1);
}

/// Records an upstream fetch. `outcome` is `ok`, `empty`, or an error category.
pub fn record_upstream_fetch(mode: &'static str, outcome: &'static str) {
    counter!(UPSTREAM_FETCHES_TOTAL, "mode" => mode, "outcome" => outcome).increment(1);
}

/// Records a binding write. `outcome` is `ok` or an error category.
pub fn record_binding_update(outcome: &'static str) {
    counter!(BINDING_UPDATES_TOTAL, "outcome" => outcome).increment(1);
}
