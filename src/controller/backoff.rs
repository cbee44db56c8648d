//! # Retry Backoff
//!
//! Exponential backoff for conflicting status writes.
//!
//! With the defaults (4 steps, 10ms, factor 5) a write is attempted at most four
//! times, sleeping 10ms, 50ms and 250ms between attempts.

use crate::constants::{
    DEFAULT_STATUS_UPDATE_RETRY_FACTOR, DEFAULT_STATUS_UPDATE_RETRY_INITIAL_MS,
    DEFAULT_STATUS_UPDATE_RETRY_STEPS,
};
use std::time::Duration;

/// Bounded exponential backoff without jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    /// Total attempts, including the first one
    pub steps: u32,
    /// Delay after the first failed attempt
    pub initial: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub factor: u32,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STATUS_UPDATE_RETRY_STEPS,
            initial: Duration::from_millis(DEFAULT_STATUS_UPDATE_RETRY_INITIAL_MS),
            factor: DEFAULT_STATUS_UPDATE_RETRY_FACTOR,
        }
    }
}

impl RetryBackoff {
    pub fn new(steps: u32, initial: Duration, factor: u32) -> Self {
        Self {
            steps: steps.max(1),
            initial,
            factor: factor.max(1),
        }
    }

    /// Delay to wait after failed attempt `attempt` (0-indexed), or `None`
    /// when no attempts remain
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt.saturating_add(1) >= self.steps {
            return None;
        }
        let multiplier = self.factor.checked_pow(attempt).unwrap_or(u32::MAX);
        Some(self.initial.saturating_mul(multiplier))
    }
}
