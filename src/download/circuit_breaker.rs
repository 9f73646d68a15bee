//! Consecutive-failure circuit breaker for one download run.

use tracing::{debug, warn};

use super::constants::CIRCUIT_BREAKER_THRESHOLD;

/// Counts consecutive item failures; opens at the threshold and stays open
/// for the rest of the run.
///
/// Owned by one engine instance, never shared between runs.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive_failures: u32,
    open: bool,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CIRCUIT_BREAKER_THRESHOLD)
    }
}

impl CircuitBreaker {
    /// Creates a breaker that opens after `threshold` consecutive failures (at least 1).
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
            open: false,
        }
    }

    /// Resets the failure count.
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            debug!(
                previous = self.consecutive_failures,
                "success resets failure count"
            );
        }
        self.consecutive_failures = 0;
    }

    /// Counts a failure. Returns true when this failure opened the circuit.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        if !self.open && self.consecutive_failures >= self.threshold {
            self.open = true;
            warn!(
                failures = self.consecutive_failures,
                "circuit breaker opened; halting downloads for this run"
            );
            return true;
        }
        false
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
