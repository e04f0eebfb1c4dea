//! Generation request and dispatch options.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Cache category of a request. Each category has its own time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheCategory {
    MealPlan,
    Recipe,
    RecipeSuggestion,
    Nutrition,
    ShoppingList,
    General,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 6] = [
        CacheCategory::MealPlan,
        CacheCategory::Recipe,
        CacheCategory::RecipeSuggestion,
        CacheCategory::Nutrition,
        CacheCategory::ShoppingList,
        CacheCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::MealPlan => "meal-plan",
            CacheCategory::Recipe => "recipe",
            CacheCategory::RecipeSuggestion => "recipe-suggestion",
            CacheCategory::Nutrition => "nutrition",
            CacheCategory::ShoppingList => "shopping-list",
            CacheCategory::General => "general",
        }
    }

    /// Built-in time-to-live, used unless the cache config overrides it.
    pub fn default_ttl(&self) -> Duration {
        const HOUR: u64 = 60 * 60;
        match self {
            CacheCategory::MealPlan => Duration::from_secs(24 * HOUR),
            CacheCategory::Recipe => Duration::from_secs(7 * 24 * HOUR),
            CacheCategory::RecipeSuggestion => Duration::from_secs(HOUR),
            CacheCategory::Nutrition => Duration::from_secs(30 * 24 * HOUR),
            CacheCategory::ShoppingList => Duration::from_secs(12 * HOUR),
            CacheCategory::General => Duration::from_secs(30 * 60),
        }
    }
}

impl Default for CacheCategory {
    fn default() -> Self {
        CacheCategory::General
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch tier. `High` runs inline; `Normal` and `Low` go through the batch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn is_immediate(&self) -> bool {
        matches!(self, Priority::High)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Tuning parameters forwarded to the upstream model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Ask the model for structured (JSON) output.
    #[serde(default)]
    pub json_output: bool,
}

/// A single generation request. Build a new one per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub prompt: String,
    pub model: String,
    #[serde(default)]
    pub config: GenerationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<Map<String, Value>>,
    #[serde(default)]
    pub category: CacheCategory,
}

impl Request {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            config: GenerationConfig::default(),
            user_context: None,
            category: CacheCategory::default(),
        }
    }

    pub fn with_category(mut self, category: CacheCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.config.max_output_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_json_output(mut self, json: bool) -> Self {
        self.config.json_output = json;
        self
    }

    pub fn with_user_context(mut self, context: Map<String, Value>) -> Self {
        self.user_context = Some(context);
        self
    }

    /// Insert one key into the user context, creating it if needed.
    pub fn with_context_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.user_context
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Reject requests that can never be dispatched.
    ///
    /// These are caller bugs, so they are surfaced immediately and never retried.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(Error::validation_with_context(
                "prompt must not be empty",
                ErrorContext::new()
                    .with_field_path("request.prompt")
                    .with_origin("request_validator"),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::validation_with_context(
                "model must not be empty",
                ErrorContext::new()
                    .with_field_path("request.model")
                    .with_origin("request_validator"),
            ));
        }
        if let Some(t) = self.config.temperature {
            if !t.is_finite() {
                return Err(Error::validation_with_context(
                    "temperature must be a finite number",
                    ErrorContext::new()
                        .with_field_path("request.config.temperature")
                        .with_details(format!("got {}", t))
                        .with_origin("request_validator"),
                ));
            }
        }
        Ok(())
    }
}

/// Per-call options for [`RequestManager::generate`](crate::RequestManager::generate).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Overrides the request's own category when set.
    pub category: Option<CacheCategory>,
    pub priority: Priority,
    /// Total upstream attempts; falls back to the configured retry policy.
    pub max_retries: Option<u32>,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn high() -> Self {
        Self::new().with_priority(Priority::High)
    }

    pub fn low() -> Self {
        Self::new().with_priority(Priority::Low)
    }

    pub fn with_category(mut self, category: CacheCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn effective_category(&self, request: &Request) -> CacheCategory {
        self.category.unwrap_or(request.category)
    }
}
