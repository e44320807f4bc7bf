//! Exponential backoff schedule.

use std::time::Duration;

use crate::config::RetryConfig;

/// Bounded exponential backoff.
///
/// The delay before attempt *n + 1* is `base_delay * multiplier^(n - 1)`
/// where *n* is the 1-based number of the attempt that just failed.  No
/// delay follows the final attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            multiplier: config.multiplier.max(1),
        }
    }

    /// Retry immediately; used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Delay to wait after `attempt` (1-based) failed, or `None` if it was
    /// the last one.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.saturating_pow(attempt - 1);
        Some(self.base_delay.saturating_mul(factor))
    }

    /// Every inter-attempt delay, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .filter_map(|attempt| self.delay_after(attempt))
            .collect()
    }
}
