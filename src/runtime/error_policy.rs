//! # Error Policy
//!
//! Requeue delays for failed reconciles.

use crate::controller::reconciler::{BackoffState, ObjectKey, Reconciler, ReconcilerError};
use crate::crd::Component;
use crate::observability::metrics;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fallback delay when the backoff map cannot be locked
const FALLBACK_BACKOFF_SECS: u64 = 60;

/// Requeue a failed instance with Fibonacci backoff
///
/// Backoff state is kept per `namespace/name` so one failing instance never
/// slows down another; a successful pass resets it.
pub fn handle_reconciliation_error<K: Component>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler<K>>,
) -> Action {
    let key = ObjectKey::of(obj.as_ref());
    let error_span = tracing::error_span!(
        "controller.reconciliation_error",
        component = K::COMPONENT,
        resource.name = key.name.as_str(),
        resource.namespace = key.namespace.as_str(),
    );
    let _error_guard = error_span.enter();

    error!(error = %error, "Reconciliation failed for {}", key);
    metrics::increment_reconciliation_errors();

    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(key.to_string())
                .or_insert_with(BackoffState::new);
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff states: {}, using default backoff", e);
            (FALLBACK_BACKOFF_SECS, 0)
        }
    };

    let next_attempt = i64::try_from(backoff_seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .map(|delay| (chrono::Utc::now() + delay).to_rfc3339())
        .unwrap_or_default();
    info!(
        backoff_secs = backoff_seconds,
        error_count,
        next_attempt = next_attempt.as_str(),
        "Retrying with Fibonacci backoff"
    );

    metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}
