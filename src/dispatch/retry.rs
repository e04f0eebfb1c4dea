//! Retry policy with exponential backoff.
//!
//! Every upstream failure is treated as transient. The policy only bounds how
//! often and how long the dispatcher keeps trying.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per logical request, including the first.
    pub max_retries: u32,
    /// Delay unit; the wait after failed attempt `n` is `base_delay * 2^n`.
    #[serde(with = "crate::config::duration_ms", rename = "base_delay_ms")]
    pub base_delay: Duration,
    #[serde(
        with = "crate::config::duration_ms_opt",
        rename = "max_delay_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_delay: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: None,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }
    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Attempt budget for one request; a per-call override wins, and at least one attempt is made.
    pub fn max_attempts(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.config.max_retries).max(1)
    }

    /// Wait before retrying after `attempt` (1-based) failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self.config.base_delay.saturating_mul(factor);
        match self.config.max_delay {
            Some(cap) if delay > cap => cap,
            _ => delay,
        }
    }

    /// `Some(delay)` to try again, `None` once `attempt` has used up `max_attempts`.
    pub fn next_delay(&self, attempt: u32, max_attempts: u32) -> Option<Duration> {
        if attempt >= max_attempts {
            None
        } else {
            Some(self.backoff(attempt))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_respects_cap_and_saturates() {
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .with_base_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_millis(500)),
        );
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(500));
        // Shift overflow must not panic.
        assert_eq!(policy.backoff(64), Duration::from_millis(500));
    }

    #[test]
    fn test_next_delay_stops_at_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(1, 3), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(2, 3), Some(Duration::from_secs(4)));
        assert_eq!(policy.next_delay(3, 3), None);
    }

    #[test]
    fn test_max_attempts_override_and_floor() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(None), 3);
        assert_eq!(policy.max_attempts(Some(5)), 5);
        assert_eq!(policy.max_attempts(Some(0)), 1);
    }
}
