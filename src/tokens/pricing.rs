//! Per-model prices and the cost of an estimated exchange.

use serde::{Deserialize, Serialize};

/// Share of an exchange's tokens billed at the input price; the rest is billed as output.
pub const INPUT_TOKEN_SHARE: f64 = 0.7;

/// Prices in USD per 1k tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model: String,
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

fn per_thousand(tokens: u64, rate: f64) -> f64 {
    tokens as f64 / 1000.0 * rate
}

impl ModelPricing {
    pub fn new(model: impl Into<String>, input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            model: model.into(),
            input_per_1k,
            output_per_1k,
        }
    }

    pub fn price(&self, input_tokens: u64, output_tokens: u64) -> CostBreakdown {
        CostBreakdown {
            input_tokens,
            output_tokens,
            input_cost: per_thousand(input_tokens, self.input_per_1k),
            output_cost: per_thousand(output_tokens, self.output_per_1k),
        }
    }

    /// Price an exchange whose tokens were only estimated as one total.
    pub fn price_total(&self, total_tokens: u64) -> CostBreakdown {
        let input = (total_tokens as f64 * INPUT_TOKEN_SHARE).round() as u64;
        self.price(input, total_tokens.saturating_sub(input))
    }

    pub fn gemini_flash_8b() -> Self {
        Self::new("gemini-1.5-flash-8b", 0.0000375, 0.00015)
    }
    pub fn gemini_flash() -> Self {
        Self::new("gemini-1.5-flash", 0.000075, 0.0003)
    }
    pub fn gemini_pro() -> Self {
        Self::new("gemini-1.5-pro", 0.00125, 0.005)
    }
}

/// Known model prices, looked up by exact model id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    models: Vec<ModelPricing>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            models: vec![
                ModelPricing::gemini_flash_8b(),
                ModelPricing::gemini_flash(),
                ModelPricing::gemini_pro(),
            ],
        }
    }
}

impl PricingTable {
    pub fn empty() -> Self {
        Self { models: Vec::new() }
    }
    /// Add or replace the price for `pricing.model`.
    pub fn with_model(mut self, pricing: ModelPricing) -> Self {
        self.models.retain(|m| m.model != pricing.model);
        self.models.push(pricing);
        self
    }
    pub fn for_model(&self, model: &str) -> Option<&ModelPricing> {
        self.models.iter().find(|m| m.model == model)
    }
    /// Estimated cost for `total_tokens` on `model`; unknown models are free.
    pub fn cost(&self, model: &str, total_tokens: u64) -> f64 {
        match self.for_model(model) {
            Some(p) => p.price_total(total_tokens).total(),
            None => {
                tracing::debug!(model, "no pricing for model; cost recorded as zero");
                0.0
            }
        }
    }
}

/// Input and output share of one priced exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.input_cost + self.output_cost
    }
}

impl std::fmt::Display for CostBreakdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:.6}", self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_is_seventy_thirty() {
        let p = ModelPricing::new("m", 1.0, 2.0);
        let cost = p.price_total(1000);
        assert_eq!(cost.input_tokens, 700);
        assert_eq!(cost.output_tokens, 300);
        assert!((cost.total() - (0.7 + 0.6)).abs() < 1e-9);
        assert_eq!(cost.to_string(), "$1.300000");
    }

    #[test]
    fn test_table_lookup_and_override() {
        let table = PricingTable::default();
        assert!(table.for_model("gemini-1.5-pro").is_some());
        assert_eq!(table.cost("unknown-model", 1000), 0.0);

        let table = table.with_model(ModelPricing::new("gemini-1.5-pro", 0.0, 0.0));
        assert_eq!(table.cost("gemini-1.5-pro", 1000), 0.0);
        assert!(PricingTable::empty().for_model("gemini-1.5-pro").is_none());
    }
}
