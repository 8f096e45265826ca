//! # Outcome
//!
//! Result of an install hook or a reconcile stage.
//!
//! A dependency that is not ready yet is not an error: it stops the current
//! pass without touching InstallSucceeded and waits for the next trigger.

use std::fmt;

#[derive(Debug)]
pub enum Outcome {
    /// Continue with the next hook / stage
    Success,
    /// A dependency is not ready yet; stop this pass quietly
    Retryable(String),
    /// Hard failure, surfaced to the controller runtime
    Fatal(anyhow::Error),
}

impl Outcome {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Outcome::Retryable(reason.into())
    }

    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        Outcome::Fatal(err.into())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::Retryable(reason) => write!(f, "not ready: {reason}"),
            Outcome::Fatal(e) => write!(f, "failed: {e}"),
        }
    }
}
