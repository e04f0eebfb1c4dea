//! 类型系统模块：定义请求、调度选项与生成结果等核心数据类型。
//!
//! # Types Module
//!
//! This module defines the data that flows through the gateway: the request a
//! caller builds, the options that pick its cache category and dispatch tier,
//! and the result that comes back.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Request`] | Prompt, model, tuning config, user context and cache category |
//! | [`GenerationConfig`] | Output-size, randomness and structured-output settings |
//! | [`CacheCategory`] | Fixed set of categories, each with its own TTL |
//! | [`Priority`] | Immediate (`High`) or queued (`Normal`/`Low`) dispatch |
//! | [`GenerateOptions`] | Per-call category override, priority and retry budget |
//! | [`GenerationResult`] | Payload plus model, token and cost accounting |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_gateway::types::{CacheCategory, GenerateOptions, Request};
//!
//! let request = Request::new("list 3 breakfasts", "fast")
//!     .with_category(CacheCategory::RecipeSuggestion)
//!     .with_context_value("diet", "vegetarian");
//! let options = GenerateOptions::low().with_max_retries(2);
//! assert_eq!(options.effective_category(&request), CacheCategory::RecipeSuggestion);
//! ```

pub mod request;
pub mod result;

pub use request::{CacheCategory, GenerateOptions, GenerationConfig, Priority, Request};
pub use result::GenerationResult;
