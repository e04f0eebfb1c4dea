//! 用量统计：请求数、缓存命中、Token、成本与平均响应时间。
//!
//! Usage accounting for the gateway.
//!
//! Counters accumulate for the lifetime of a [`UsageAccountant`] and are never
//! persisted or reset.

use crate::tokens::{CharacterEstimator, PricingTable, TokenCounter};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Weight of the newest sample in the response-time moving average.
pub const LATENCY_SMOOTHING: f64 = 0.1;

/// Point-in-time copy of the usage counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Requests served, from cache or upstream.
    pub total_requests: u64,
    pub cache_hits: u64,
    /// Requests that exhausted their retry budget.
    pub failed_requests: u64,
    pub total_tokens_used: u64,
    pub total_cost: f64,
    /// Exponential moving average, not a true mean.
    pub avg_response_time_ms: f64,
}

impl UsageStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    pub chars_per_token: f64,
    pub pricing: PricingTable,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            chars_per_token: 4.0,
            pricing: PricingTable::default(),
        }
    }
}

impl UsageConfig {
    pub fn with_chars_per_token(mut self, ratio: f64) -> Self {
        self.chars_per_token = ratio;
        self
    }
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }
}

pub struct UsageAccountant {
    counter: CharacterEstimator,
    pricing: PricingTable,
    stats: Mutex<UsageStats>,
}

impl UsageAccountant {
    pub fn new(config: UsageConfig) -> Self {
        Self {
            counter: CharacterEstimator::with_ratio(config.chars_per_token),
            pricing: config.pricing,
            stats: Mutex::new(UsageStats::default()),
        }
    }

    /// Token estimate for one prompt/response exchange.
    pub fn estimate_tokens(&self, prompt: &str, response: &str) -> u64 {
        self.counter.count_exchange(prompt, response) as u64
    }

    /// Estimated cost of `tokens` on the model that actually served the call.
    pub fn estimate_cost(&self, model: &str, tokens: u64) -> f64 {
        self.pricing.cost(model, tokens)
    }

    pub fn record(&self, tokens: u64, cost: f64, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let mut stats = self.lock();
        // The first sample seeds the average.
        stats.avg_response_time_ms = if stats.total_requests == stats.cache_hits {
            elapsed_ms
        } else {
            stats.avg_response_time_ms * (1.0 - LATENCY_SMOOTHING) + elapsed_ms * LATENCY_SMOOTHING
        };
        stats.total_requests += 1;
        stats.total_tokens_used += tokens;
        stats.total_cost += cost;
    }

    pub fn record_cache_hit(&self) {
        let mut stats = self.lock();
        stats.total_requests += 1;
        stats.cache_hits += 1;
    }

    pub fn record_failure(&self) {
        self.lock().failed_requests += 1;
    }

    pub fn snapshot(&self) -> UsageStats {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, UsageStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for UsageAccountant {
    fn default() -> Self {
        Self::new(UsageConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let acc = UsageAccountant::default();
        acc.record(100, 0.5, Duration::from_millis(200));
        acc.record(50, 0.25, Duration::from_millis(400));
        let s = acc.snapshot();
        assert_eq!(s.total_requests, 2);
        assert_eq!(s.total_tokens_used, 150);
        assert!((s.total_cost - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_latency_is_smoothed_not_averaged() {
        let acc = UsageAccountant::default();
        acc.record(0, 0.0, Duration::from_millis(1000));
        assert!((acc.snapshot().avg_response_time_ms - 1000.0).abs() < 1e-9);
        acc.record(0, 0.0, Duration::from_millis(2000));
        // 0.9 * 1000 + 0.1 * 2000, where a true mean would be 1500.
        assert!((acc.snapshot().avg_response_time_ms - 1100.0).abs() < 1e-9);
    }

    #[test]
    fn test_cache_hits_do_not_move_latency() {
        let acc = UsageAccountant::default();
        acc.record_cache_hit();
        acc.record_cache_hit();
        acc.record(10, 0.0, Duration::from_millis(300));
        let s = acc.snapshot();
        assert_eq!(s.total_requests, 3);
        assert_eq!(s.cache_hits, 2);
        assert!((s.avg_response_time_ms - 300.0).abs() < 1e-9);
        assert!((s.hit_ratio() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_failures_are_counted_separately() {
        let acc = UsageAccountant::default();
        acc.record_failure();
        let s = acc.snapshot();
        assert_eq!(s.failed_requests, 1);
        assert_eq!(s.total_requests, 0);
    }

    #[test]
    fn test_estimates_use_config() {
        let acc = UsageAccountant::new(
            UsageConfig::default()
                .with_chars_per_token(2.0)
                .with_pricing(PricingTable::empty()),
        );
        assert_eq!(acc.estimate_tokens("abcd", "ef"), 3);
        assert_eq!(acc.estimate_cost("gemini-1.5-pro", 1000), 0.0);
    }
}
