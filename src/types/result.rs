//! Results handed back to callers.

use serde::{Deserialize, Serialize};

/// Outcome of a successful [`RequestManager::generate`](crate::RequestManager::generate) call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Raw upstream output. Cache hits return the stored bytes unchanged.
    pub payload: String,
    /// Model that actually produced the payload (after optimization).
    pub model_used: String,
    pub tokens_used: u64,
    /// Estimated cost of the upstream call; zero for cache hits.
    pub cost: f64,
    pub cached: bool,
}

impl GenerationResult {
    /// Parse the payload as JSON, for requests made with structured output enabled.
    pub fn json(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}
