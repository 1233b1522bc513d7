//! Exponential backoff retry policy.
//!
//! The policy is a pure value object; the orchestrator owns the budget
//! check and the sleep primitive.

use serde::{Deserialize, Serialize};

/// Backoff schedule for provider retries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure. The orchestrator's
    /// budget check is applied against the post-increment attempt counter,
    /// so a policy with `max_retries = N` allows `N + 1` runner calls.
    pub max_retries: u32,
    /// Delay before the first retry, in seconds.
    pub base_delay_seconds: f64,
    /// Multiplier applied for each subsequent retry; must be >= 1.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay_seconds: 1.0,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_seconds: f64, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            base_delay_seconds,
            backoff_multiplier,
        }
    }

    /// Delay in seconds before retry number `retry_index` (1-based):
    /// `base * multiplier^(retry_index - 1)`.
    pub fn compute_delay(&self, retry_index: u32) -> f64 {
        let exponent = retry_index.saturating_sub(1);
        self.base_delay_seconds * self.backoff_multiplier.powi(exponent as i32)
    }
}
