//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default periodic resync for converged instances (seconds)
/// Also used as the requeue delay when a dependency is not ready yet
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 600;

/// Default interval between CRD presence checks in the dynamic scaler (milliseconds)
pub const DEFAULT_SCALER_POLL_INTERVAL_MS: u64 = 1000;

/// Default delay before restarting a controller stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default manifest locations inside the operator image
pub const DEFAULT_SERVING_MANIFEST_PATH: &str = "/var/run/ko/knative-serving";
pub const DEFAULT_EVENTING_MANIFEST_PATH: &str = "/var/run/ko/knative-eventing";

/// Field manager / finalizer owner name
pub const OPERATOR_NAME: &str = "knative-component-operator";

/// Annotations stamped on every managed resource so watchers can map events back to the instance
pub const OWNER_NAME_ANNOTATION: &str = "operator.knative.dev/owner-name";
pub const OWNER_NAMESPACE_ANNOTATION: &str = "operator.knative.dev/owner-namespace";

/// Prefix of environment variables carrying image overrides
pub const IMAGE_ENV_PREFIX: &str = "IMAGE_";

/// Separator between deployment and container in image override keys
pub const IMAGE_ENV_SEPARATOR: &str = "__";

/// Default replica count applied by the HA defaults of the eventing extension
pub const DEFAULT_HA_REPLICAS: i32 = 2;
