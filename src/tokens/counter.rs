//! Token counter implementations.

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    /// Tokens for a prompt/response exchange, counted over the combined text.
    fn count_exchange(&self, prompt: &str, response: &str) -> usize {
        self.count(prompt) + self.count(response)
    }
}

/// Fixed character-to-token ratio estimator.
#[derive(Debug, Clone)]
pub struct CharacterEstimator {
    chars_per_token: f64,
}
impl CharacterEstimator {
    pub fn new() -> Self {
        Self::with_ratio(4.0)
    }
    pub fn with_ratio(r: f64) -> Self {
        let chars_per_token = if r.is_finite() && r > 0.0 { r } else { 4.0 };
        Self { chars_per_token }
    }
    pub fn ratio(&self) -> f64 {
        self.chars_per_token
    }
}
impl Default for CharacterEstimator {
    fn default() -> Self {
        Self::new()
    }
}
impl TokenCounter for CharacterEstimator {
    fn count(&self, text: &str) -> usize {
        (text.chars().count() as f64 / self.chars_per_token).ceil() as usize
    }

    fn count_exchange(&self, prompt: &str, response: &str) -> usize {
        let chars = prompt.chars().count() + response.chars().count();
        (chars as f64 / self.chars_per_token).ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_estimator_rounds_up() {
        let c = CharacterEstimator::new();
        assert_eq!(c.count(""), 0);
        assert_eq!(c.count("abcd"), 1);
        assert_eq!(c.count("abcde"), 2);
    }

    #[test]
    fn test_exchange_counts_combined_text() {
        let c = CharacterEstimator::new();
        // 3 + 3 chars = 6 -> 2 tokens, not 1 + 1
        assert_eq!(c.count_exchange("abc", "def"), 2);
        assert_eq!(c.count_exchange(&"x".repeat(400), &"y".repeat(400)), 200);
    }

    #[test]
    fn test_invalid_ratio_falls_back() {
        assert_eq!(CharacterEstimator::with_ratio(0.0).ratio(), 4.0);
        assert_eq!(CharacterEstimator::with_ratio(f64::NAN).ratio(), 4.0);
        assert_eq!(CharacterEstimator::with_ratio(2.0).count("abcd"), 2);
    }
}
