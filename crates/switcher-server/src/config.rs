//! Configuration for the artifact switcher.
//!
//! Loaded from a TOML or JSON file (chosen by extension), then overridden by
//! `ARTIFACT_SWITCHER_*` environment variables, then validated. The defaults
//! serve `prod` on `/` in stream mode, plus `/hydrate`, `/cache` and
//! `/redirect`.
//!
//! ```toml
//! [server]
//! listen_port = 4000
//! request_timeout = "30s"
//!
//! [bindings]
//! prod = "https://cdn.example.com/prod/index.html"
//!
//! [[routes]]
//! path = "/"
//! env = "prod"
//! mode = "stream"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use http::HeaderName;
use serde::{Deserialize, Serialize};
use switcher_core::{CacheConfig, DeliveryMode, EnvName, HydrationPayload};
use switcher_fetch::FetchConfig;
use switcher_telemetry::{LogConfig, LogFormat, MetricsConfig};

use crate::error::ConfigError;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "ARTIFACT_SWITCHER_";

/// Path of the binding update endpoint.
pub const UPDATE_PATH: &str = "/api/set-new-version";

/// Path of the liveness endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Path of the Prometheus endpoint.
pub const METRICS_PATH: &str = "/metrics";

const DEFAULT_PROD_URL: &str = "https://avatars.githubusercontent.com/u/2343787?v=4";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitcherConfig {
    /// Listener settings.
    pub server: ServerSettings,
    /// Upstream fetch settings.
    pub upstream: UpstreamSettings,
    /// CACHE mode settings.
    pub cache: CacheSettings,
    /// Logging and metrics.
    pub telemetry: TelemetrySettings,
    /// Seed bindings for the in-memory store, env name to URL.
    pub bindings: BTreeMap<String, String>,
    /// Delivery routes.
    pub routes: Vec<RouteConfig>,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        let route = |path: &str, mode| RouteConfig {
            path: path.to_string(),
            env: "prod".to_string(),
            mode,
            env_header: None,
            hydration: HydrationPayload::new(),
        };

        let mut hydrate = route("/hydrate", DeliveryMode::Hydrate);
        hydrate.hydration = HydrationPayload::new().with("hydrated", "yes");

        Self {
            server: ServerSettings::default(),
            upstream: UpstreamSettings::default(),
            cache: CacheSettings::default(),
            telemetry: TelemetrySettings::default(),
            bindings: BTreeMap::from([("prod".to_string(), DEFAULT_PROD_URL.to_string())]),
            routes: vec![
                route("/", DeliveryMode::Stream),
                hydrate,
                route("/cache", DeliveryMode::Cache),
                route("/redirect", DeliveryMode::Defer),
            ],
        }
    }
}

impl SwitcherConfig {
    /// Loads configuration from a `.toml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => Self::from_toml_str(&content),
            "json" => serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Parses TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            format: "TOML",
            message: e.to_string(),
        })
    }

    /// Applies `ARTIFACT_SWITCHER_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which receives full variable names.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(addr) = var("LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(port) = var("LISTEN_PORT").and_then(|p| p.parse().ok()) {
            self.server.listen_port = port;
        }
        if let Some(secs) = var("FETCH_TIMEOUT").and_then(|s| s.parse::<u64>().ok()) {
            self.upstream.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.telemetry.log_level = level;
        }
        if let Some(format) = var("LOG_FORMAT").and_then(|f| f.parse().ok()) {
            self.telemetry.log_format = format;
        }

        self
    }

    /// Checks the configuration for inconsistencies.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.server.request_timeout.is_zero() {
            return Err(ConfigError::invalid("server.request_timeout must be positive"));
        }
        if self.upstream.fetch_timeout.is_zero() {
            return Err(ConfigError::invalid("upstream.fetch_timeout must be positive"));
        }

        for (env, url) in &self.bindings {
            if env.is_empty() {
                return Err(ConfigError::invalid("binding names must be non-empty"));
            }
            if url.is_empty() {
                return Err(ConfigError::invalid(format!("binding {env:?} has an empty URL")));
            }
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if !route.path.starts_with('/') {
                return Err(ConfigError::invalid(format!(
                    "route path {:?} must start with '/'",
                    route.path
                )));
            }
            if [UPDATE_PATH, HEALTH_PATH, METRICS_PATH].contains(&route.path.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "route path {} is reserved",
                    route.path
                )));
            }
            if !seen.insert(route.path.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate route path {}",
                    route.path
                )));
            }
            if route.env.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "route {} has an empty env",
                    route.path
                )));
            }
            if let Some(header) = &route.env_header {
                HeaderName::try_from(header.as_str()).map_err(|e| {
                    ConfigError::invalid(format!("route {} env_header: {e}", route.path))
                })?;
            }
        }

        Ok(())
    }

    /// Returns the listen socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.server.listen_addr.parse().map_err(|e| {
            ConfigError::invalid(format!(
                "invalid listen address {:?}: {e}",
                self.server.listen_addr
            ))
        })?;
        Ok(SocketAddr::new(ip, self.server.listen_port))
    }

    /// Logging settings for `switcher-telemetry`.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.telemetry.log_level.clone(),
            format: self.telemetry.log_format,
            ..LogConfig::default()
        }
    }

    /// Metrics settings for `switcher-telemetry`.
    #[must_use]
    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            enabled: self.telemetry.metrics_enabled,
            ..MetricsConfig::default()
        }
    }

    /// Upstream client settings.
    #[must_use]
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: self.upstream.fetch_timeout,
            pool_max_idle_per_host: self.upstream.pool_max_idle_per_host,
            ..FetchConfig::default()
        }
    }

    /// Cache bounds.
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::bounded(self.cache.max_entries)
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// IP address to bind.
    pub listen_addr: String,
    /// Port to bind; 0 picks a free port.
    pub listen_port: u16,
    /// How long to wait for open connections on shutdown.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Bound on body collection and pipeline execution.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Adopt a valid incoming `x-request-id` instead of generating one.
    pub trust_request_id: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 4000,
            shutdown_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            trust_request_id: false,
        }
    }
}

/// Upstream fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Timeout for each fetch.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    /// Idle pooled connections per upstream host.
    pub pool_max_idle_per_host: usize,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 32,
        }
    }
}

/// CACHE mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum cached environments; 0 means unbounded.
    pub max_entries: usize,
    /// Refresh an entry in the background after serving a hit.
    pub refresh_on_hit: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 0,
            refresh_on_hit: true,
        }
    }
}

/// Logging and metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// `EnvFilter` directive.
    pub log_level: String,
    /// Log line format.
    pub log_format: LogFormat,
    /// Install the Prometheus recorder and serve `/metrics`.
    pub metrics_enabled: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: true,
        }
    }
}

/// One `GET` delivery route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Exact request path.
    pub path: String,
    /// Environment served, or the fallback when `env_header` is set.
    pub env: String,
    /// Delivery mode.
    #[serde(default)]
    pub mode: DeliveryMode,
    /// Optional header naming the environment per request.
    #[serde(default)]
    pub env_header: Option<String>,
    /// Data substituted in HYDRATE mode.
    #[serde(default)]
    pub hydration: HydrationPayload,
}

impl RouteConfig {
    /// Returns the configured environment name.
    #[must_use]
    pub fn env_name(&self) -> Option<EnvName> {
        EnvName::new(self.env.as_str())
    }
}

/// Durations written as `"500ms"`, `"30s"`, `"5m"`, `"1h"` or bare seconds.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let invalid = || format!("invalid duration: {s:?}");

        let (number, unit_ms) = if let Some(n) = s.strip_suffix("ms") {
            (n, 1)
        } else if let Some(n) = s.strip_suffix('s') {
            (n, 1_000)
        } else if let Some(n) = s.strip_suffix('m') {
            (n, 60_000)
        } else if let Some(n) = s.strip_suffix('h') {
            (n, 3_600_000)
        } else {
            (s, 1_000)
        };

        number
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(unit_ms))
            .map(Duration::from_millis)
            .ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reproduce_reference_deployment() {
        let config = SwitcherConfig::default();
        assert_eq!(config.server.listen_port, 4000);
        assert_eq!(config.bindings.get("prod").map(String::as_str), Some(DEFAULT_PROD_URL));

        let paths: Vec<_> = config.routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/hydrate", "/cache", "/redirect"]);
        assert_eq!(config.routes[0].mode, DeliveryMode::Stream);
        assert_eq!(config.routes[1].hydration.to_json(), r#"{"hydrated":"yes"}"#);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_config() {
        let config = SwitcherConfig::from_toml_str(
            r#"
[server]
listen_addr = "127.0.0.1"
listen_port = 8080
request_timeout = "500ms"

[cache]
max_entries = 16
refresh_on_hit = false

[telemetry]
log_format = "pretty"

[bindings]
staging = "https://example.com/staging.html"

[[routes]]
path = "/staging"
env = "staging"
mode = "hydrate"
hydration = { user = "anon" }

[[routes]]
path = "/by-header"
env = "staging"
env_header = "x-env-target"
"#,
        )
        .unwrap();

        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.server.request_timeout, Duration::from_millis(500));
        assert_eq!(config.server.shutdown_timeout, Duration::from_secs(30));
        assert!(!config.cache.refresh_on_hit);
        assert_eq!(config.cache_config().max_entries, 16);
        assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
        assert_eq!(config.bindings.len(), 1);
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[0].hydration.to_json(), r#"{"user":"anon"}"#);
        assert_eq!(config.routes[1].mode, DeliveryMode::Stream);
        assert_eq!(config.routes[1].env_header.as_deref(), Some("x-env-target"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_config_file() {
        let path = std::env::temp_dir().join(format!(
            "artifact-switcher-config-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{"server": {"listen_port": 9000}, "routes": [{"path": "/x", "env": "qa", "mode": "defer"}]}"#,
        )
        .unwrap();

        let config = SwitcherConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.server.listen_port, 9000);
        assert_eq!(config.routes[0].mode, DeliveryMode::Defer);
        assert_eq!(config.routes[0].env_name().unwrap().as_str(), "qa");
    }

    #[test]
    fn test_unsupported_extension() {
        let err = SwitcherConfig::from_file("/nonexistent/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        let path = std::env::temp_dir().join(format!(
            "artifact-switcher-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "server: {}").unwrap();
        let err = SwitcherConfig::from_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, ConfigError::UnsupportedFormat(ext) if ext == "yaml"));
    }

    #[test]
    fn test_env_overrides() {
        let vars = BTreeMap::from([
            ("ARTIFACT_SWITCHER_LISTEN_ADDR", "127.0.0.1"),
            ("ARTIFACT_SWITCHER_LISTEN_PORT", "5000"),
            ("ARTIFACT_SWITCHER_FETCH_TIMEOUT", "5"),
            ("ARTIFACT_SWITCHER_LOG_LEVEL", "debug"),
            ("ARTIFACT_SWITCHER_LOG_FORMAT", "pretty"),
        ]);
        let config = SwitcherConfig::default()
            .with_overrides_from(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.server.listen_addr, "127.0.0.1");
        assert_eq!(config.server.listen_port, 5000);
        assert_eq!(config.upstream.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.log_config().level, "debug");
        assert_eq!(config.log_config().format, LogFormat::Pretty);
    }

    #[test]
    fn test_bad_env_override_is_ignored() {
        let config = SwitcherConfig::default().with_overrides_from(|key| {
            (key == "ARTIFACT_SWITCHER_LISTEN_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.server.listen_port, 4000);
    }

    #[test]
    fn test_validation_rejects_bad_routes() {
        let with_route = |path: &str, env: &str| {
            let mut config = SwitcherConfig::default();
            config.routes.push(RouteConfig {
                path: path.to_string(),
                env: env.to_string(),
                mode: DeliveryMode::Stream,
                env_header: None,
                hydration: HydrationPayload::new(),
            });
            config
        };

        assert!(with_route("no-slash", "prod").validate().is_err());
        assert!(with_route("/", "prod").validate().is_err());
        assert!(with_route(UPDATE_PATH, "prod").validate().is_err());
        assert!(with_route(HEALTH_PATH, "prod").validate().is_err());
        assert!(with_route("/other", "").validate().is_err());
        assert!(with_route("/other", "prod").validate().is_ok());

        let mut config = with_route("/other", "prod");
        config.routes[4].env_header = Some("bad header".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_bindings_and_addr() {
        let mut config = SwitcherConfig::default();
        config.bindings.insert(String::new(), "https://example.com".to_string());
        assert!(config.validate().is_err());

        let mut config = SwitcherConfig::default();
        config.bindings.insert("qa".to_string(), String::new());
        assert!(config.validate().is_err());

        let mut config = SwitcherConfig::default();
        config.server.listen_addr = "localhost:80".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_duration() {
        use humantime_serde::parse_duration;

        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration(" 45 "), Ok(Duration::from_secs(45)));
        assert!(parse_duration("soon").is_err());
    }
}
