//! Token 计数与成本估算模块：按固定字符比例估算 Token，并按模型价格计算成本。
//!
//! # Token Counting and Cost Estimation Module
//!
//! Upstream responses carry no reliable usage numbers, so tokens are estimated
//! from text length and priced per model.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TokenCounter`] | Trait for token counting implementations |
//! | [`CharacterEstimator`] | Fixed character-to-token ratio (4 chars ≈ 1 token) |
//! | [`ModelPricing`] | Per-1k input/output prices for one model |
//! | [`PricingTable`] | Lookup of known model prices |
//! | [`CostBreakdown`] | Input/output cost of one exchange |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_gateway::tokens::{CharacterEstimator, PricingTable, TokenCounter};
//!
//! let counter = CharacterEstimator::new();
//! let tokens = counter.count_exchange("list 3 breakfasts", "oatmeal, eggs, toast");
//! let cost = PricingTable::default().cost("gemini-1.5-flash", tokens as u64);
//! assert!(cost > 0.0);
//! ```

mod counter;
mod pricing;

pub use counter::{CharacterEstimator, TokenCounter};
pub use pricing::{CostBreakdown, ModelPricing, PricingTable, INPUT_TOKEN_SHARE};
