//! # Fibonacci Backoff
//!
//! Retry delays for failed reconciles. Steps follow the Fibonacci sequence
//! in whole minutes and stop growing at the configured maximum:
//! 1m, 1m, 2m, 3m, 5m, 8m, 10m, 10m, ...
//!
//! ```rust
//! use knative_component_operator::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 10);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 120);
//! ```

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibonacciBackoff {
    first: u64,
    cap: u64,
    // (previous, current) step in minutes
    steps: (u64, u64),
}

impl FibonacciBackoff {
    /// Sequence starting at `min_minutes` and capped at `max_minutes`
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            first: min_minutes,
            cap: max_minutes,
            steps: (0, min_minutes),
        }
    }

    /// Current delay in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let (prev, current) = self.steps;
        self.steps = (current, prev.saturating_add(current).min(self.cap));
        current.saturating_mul(60)
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Start over from the first step
    pub fn reset(&mut self) {
        self.steps = (0, self.first);
    }
}
