//! # Conditions
//!
//! Living condition set for component installs.
//!
//! The tracked conditions are orthogonal: marking one never changes another.
//! `Ready` is derived from them after every mark and is what `kubectl get`
//! shows. [`ComponentStatus::is_ready`] is the AND over the tracked set.

use crate::crd::{ComponentStatus, Condition, ConditionStatus};

pub const DEPENDENCIES_INSTALLED: &str = "DependenciesInstalled";
pub const DEPLOYMENTS_AVAILABLE: &str = "DeploymentsAvailable";
pub const INSTALL_SUCCEEDED: &str = "InstallSucceeded";
pub const READY: &str = "Ready";

/// Condition types that participate in readiness
pub const LIVING_CONDITIONS: [&str; 3] =
    [DEPENDENCIES_INSTALLED, DEPLOYMENTS_AVAILABLE, INSTALL_SUCCEEDED];

impl ComponentStatus {
    /// Seed every tracked condition (and `Ready`) to Unknown
    ///
    /// No-op once any condition exists.
    pub fn initialize_conditions(&mut self) {
        if !self.conditions.is_empty() {
            return;
        }
        let now = now();
        for t in LIVING_CONDITIONS.iter().chain(std::iter::once(&READY)) {
            self.conditions.push(Condition {
                r#type: (*t).to_string(),
                status: ConditionStatus::Unknown,
                reason: None,
                message: None,
                last_transition_time: Some(now.clone()),
            });
        }
    }

    #[must_use]
    pub fn get_condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    #[must_use]
    pub fn is_condition_true(&self, condition_type: &str) -> bool {
        self.get_condition(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    #[must_use]
    pub fn is_condition_false(&self, condition_type: &str) -> bool {
        self.get_condition(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::False)
    }

    /// True iff every tracked condition is True
    #[must_use]
    pub fn is_ready(&self) -> bool {
        LIVING_CONDITIONS.iter().all(|t| self.is_condition_true(t))
    }

    pub fn mark_true(&mut self, condition_type: &str) {
        self.set(condition_type, ConditionStatus::True, None, None);
    }

    pub fn mark_false(&mut self, condition_type: &str, reason: &str, message: &str) {
        self.set(
            condition_type,
            ConditionStatus::False,
            Some(reason.to_string()),
            Some(message.to_string()),
        );
    }

    pub fn mark_unknown(&mut self, condition_type: &str, reason: &str, message: &str) {
        self.set(
            condition_type,
            ConditionStatus::Unknown,
            Some(reason.to_string()),
            Some(message.to_string()),
        );
    }

    pub fn mark_install_succeeded(&mut self) {
        self.mark_true(INSTALL_SUCCEEDED);
    }

    pub fn mark_install_failed(&mut self, message: &str) {
        self.mark_false(
            INSTALL_SUCCEEDED,
            "Error",
            &format!("Install failed with message: {message}"),
        );
    }

    pub fn mark_deployments_available(&mut self) {
        self.mark_true(DEPLOYMENTS_AVAILABLE);
    }

    pub fn mark_deployments_not_ready(&mut self) {
        self.mark_false(
            DEPLOYMENTS_AVAILABLE,
            "NotReady",
            "Waiting on deployments",
        );
    }

    pub fn mark_dependencies_installed(&mut self) {
        self.mark_true(DEPENDENCIES_INSTALLED);
    }

    pub fn mark_dependency_installing(&mut self, message: &str) {
        self.mark_false(
            DEPENDENCIES_INSTALLED,
            "Installing",
            &format!("Dependency installing: {message}"),
        );
    }

    pub fn mark_dependency_missing(&mut self, message: &str) {
        self.mark_false(
            DEPENDENCIES_INSTALLED,
            "Error",
            &format!("Dependency missing: {message}"),
        );
    }

    fn set(
        &mut self,
        condition_type: &str,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
    ) {
        upsert_condition(&mut self.conditions, condition_type, status, reason, message);
        if condition_type != READY {
            self.recompute_ready();
        }
    }

    fn recompute_ready(&mut self) {
        let mut status = ConditionStatus::True;
        let mut reason = None;
        let mut message = None;
        for t in LIVING_CONDITIONS {
            match self.get_condition(t) {
                Some(c) if c.status == ConditionStatus::True => {}
                Some(c) if c.status == ConditionStatus::False => {
                    status = ConditionStatus::False;
                    reason.clone_from(&c.reason);
                    message.clone_from(&c.message);
                    break;
                }
                Some(c) => {
                    status = ConditionStatus::Unknown;
                    if reason.is_none() {
                        reason.clone_from(&c.reason);
                        message.clone_from(&c.message);
                    }
                }
                None => status = ConditionStatus::Unknown,
            }
        }
        upsert_condition(&mut self.conditions, READY, status, reason, message);
    }
}

/// Insert or update a condition; the transition time only moves when the status changes
fn upsert_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: ConditionStatus,
    reason: Option<String>,
    message: Option<String>,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        if existing.status != status {
            existing.last_transition_time = Some(now());
        }
        existing.status = status;
        existing.reason = reason;
        existing.message = message;
        return;
    }
    conditions.push(Condition {
        r#type: condition_type.to_string(),
        status,
        reason,
        message,
        last_transition_time: Some(now()),
    });
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
