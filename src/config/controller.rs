//! # Controller Configuration
//!
//! Operator-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_EVENTING_MANIFEST_PATH, DEFAULT_METRICS_PORT, DEFAULT_RESYNC_PERIOD_SECS,
    DEFAULT_SCALER_POLL_INTERVAL_MS, DEFAULT_SERVER_POLL_INTERVAL_MS,
    DEFAULT_SERVER_STARTUP_TIMEOUT_SECS, DEFAULT_SERVING_MANIFEST_PATH,
    DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use std::path::PathBuf;
use std::time::Duration;

/// Operator configuration
///
/// Every setting has a default and can be overridden through the
/// environment of the operator deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Directory or file holding the serving release manifest
    pub serving_manifest_path: PathBuf,
    /// Directory or file holding the eventing release manifest
    pub eventing_manifest_path: PathBuf,
    /// Version recorded in `KnativeServing` status
    pub serving_version: String,
    /// Version recorded in `KnativeEventing` status
    pub eventing_version: String,
    /// When set, `KnativeServing` may only live in this namespace
    pub required_serving_namespace: Option<String>,
    /// When set, `KnativeEventing` may only live in this namespace
    pub required_eventing_namespace: Option<String>,
    /// Periodic resync of converged instances (seconds)
    pub resync_period_secs: u64,
    /// Interval between CRD presence checks of the scaler (milliseconds)
    pub scaler_poll_interval_ms: u64,
    pub metrics_port: u16,
    /// How long to wait for the HTTP server to bind (seconds)
    pub server_startup_timeout_secs: u64,
    pub server_poll_interval_ms: u64,
    /// Delay before restarting a controller whose stream ended (seconds)
    pub watch_restart_delay_secs: u64,
    /// Log format (json, text)
    pub log_format: String,
    pub enable_serving: bool,
    pub enable_eventing: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            serving_manifest_path: PathBuf::from(DEFAULT_SERVING_MANIFEST_PATH),
            eventing_manifest_path: PathBuf::from(DEFAULT_EVENTING_MANIFEST_PATH),
            serving_version: String::new(),
            eventing_version: String::new(),
            required_serving_namespace: None,
            required_eventing_namespace: None,
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            scaler_poll_interval_ms: DEFAULT_SCALER_POLL_INTERVAL_MS,
            metrics_port: DEFAULT_METRICS_PORT,
            server_startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            server_poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            log_format: "text".to_string(),
            enable_serving: true,
            enable_eventing: true,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            serving_manifest_path: PathBuf::from(env_var_or_default_str(
                "SERVING_MANIFEST_PATH",
                DEFAULT_SERVING_MANIFEST_PATH,
            )),
            eventing_manifest_path: PathBuf::from(env_var_or_default_str(
                "EVENTING_MANIFEST_PATH",
                DEFAULT_EVENTING_MANIFEST_PATH,
            )),
            serving_version: env_var_or_default_str("KNATIVE_SERVING_VERSION", ""),
            eventing_version: env_var_or_default_str("KNATIVE_EVENTING_VERSION", ""),
            required_serving_namespace: env_var_non_empty("REQUIRED_SERVING_NAMESPACE"),
            required_eventing_namespace: env_var_non_empty("REQUIRED_EVENTING_NAMESPACE"),
            resync_period_secs: env_var_or_default(
                "RESYNC_PERIOD_SECS",
                DEFAULT_RESYNC_PERIOD_SECS,
            ),
            scaler_poll_interval_ms: env_var_or_default(
                "SCALER_POLL_INTERVAL_MS",
                DEFAULT_SCALER_POLL_INTERVAL_MS,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            server_startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            server_poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
            enable_serving: env_var_or_default_bool("ENABLE_SERVING", true),
            enable_eventing: env_var_or_default_bool("ENABLE_EVENTING", true),
        }
    }

    #[must_use]
    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    #[must_use]
    pub fn scaler_poll_interval(&self) -> Duration {
        Duration::from_millis(self.scaler_poll_interval_ms)
    }

    #[must_use]
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    #[must_use]
    pub fn server_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.server_startup_timeout_secs)
    }

    #[must_use]
    pub fn server_poll_interval(&self) -> Duration {
        Duration::from_millis(self.server_poll_interval_ms)
    }

    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map_or(default, |v| {
            matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
        })
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = ControllerConfig::default();
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
        assert_eq!(config.resync_period(), Duration::from_secs(DEFAULT_RESYNC_PERIOD_SECS));
        assert!(config.enable_serving && config.enable_eventing);
        assert!(!config.json_logs());
    }

    #[test]
    fn test_env_helpers_fall_back_on_unset_or_invalid() {
        assert_eq!(env_var_or_default("KCO_TEST_UNSET_PORT", 42u16), 42);
        assert!(env_var_or_default_bool("KCO_TEST_UNSET_FLAG", true));
        assert_eq!(env_var_or_default_str("KCO_TEST_UNSET_STR", "x"), "x");
        assert_eq!(env_var_non_empty("KCO_TEST_UNSET_NS"), None);
    }
}
