//! # Metrics
//!
//! Prometheus metrics for the operator.
//!
//! ## Metrics Exposed
//!
//! - `knative_operator_reconciliations_total` - Total number of reconciliations
//! - `knative_operator_reconciliation_errors_total` - Reconciliations that returned an error
//! - `knative_operator_reconciliation_duration_seconds` - Duration of reconcile passes
//! - `knative_operator_requeues_total{reason}` - Requeues by reason (`dependency-wait`, `error-backoff`)
//! - `knative_up{type}` - 1 when the component instance is Ready, 0 otherwise
//! - `knative_operator_resources{kind}` - Brokers and InMemoryChannels seen by the scaler
//! - `knative_operator_resources_applied_total{action}` - Applied templates by outcome

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGaugeVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "knative_operator_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "knative_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "knative_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "knative_operator_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static COMPONENT_UP: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "knative_up",
            "Whether the component instance is Ready (1) or not (0)",
        ),
        &["type"],
    )
    .expect("Failed to create COMPONENT_UP metric - this should never happen")
});

static RESOURCES: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "knative_operator_resources",
            "Number of observed resources by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RESOURCES metric - this should never happen")
});

static RESOURCES_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "knative_operator_resources_applied_total",
            "Total number of applied manifest resources by action",
        ),
        &["action"],
    )
    .expect("Failed to create RESOURCES_APPLIED_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Registration only fails when called twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMPONENT_UP.clone()))?;
    REGISTRY.register(Box::new(RESOURCES.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_APPLIED_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

/// Set the `knative_up` gauge for one component type
pub fn set_component_up(component: &str, ready: bool) {
    COMPONENT_UP
        .with_label_values(&[component])
        .set(i64::from(ready));
}

pub fn set_resources(kind: &str, count: usize) {
    RESOURCES
        .with_label_values(&[kind])
        .set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_resources_applied(action: &str) {
    RESOURCES_APPLIED_TOTAL.with_label_values(&[action]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        let after = RECONCILIATIONS_TOTAL.get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_requeues_total_by_reason() {
        let before = REQUEUES_TOTAL.with_label_values(&["dependency-wait"]).get();
        increment_requeues_total("dependency-wait");
        let after = REQUEUES_TOTAL.with_label_values(&["dependency-wait"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_set_component_up() {
        set_component_up("test_status", true);
        assert_eq!(COMPONENT_UP.with_label_values(&["test_status"]).get(), 1);
        set_component_up("test_status", false);
        assert_eq!(COMPONENT_UP.with_label_values(&["test_status"]).get(), 0);
    }

    #[test]
    fn test_set_resources() {
        set_resources("TestKind", 3);
        assert_eq!(RESOURCES.with_label_values(&["TestKind"]).get(), 3);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        let before = RECONCILIATION_DURATION.get_sample_count();
        observe_reconciliation_duration(0.4);
        assert_eq!(RECONCILIATION_DURATION.get_sample_count(), before + 1);
    }
}
