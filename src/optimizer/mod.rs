//! 请求优化模块：在计费和发送前规整并压缩请求。
//!
//! # Request Optimization Module
//!
//! [`RequestOptimizer`] shapes a request before it is sent upstream and billed.
//! It is pure and total: every input yields a request, nothing is retried, and
//! the same input always yields the same output, so retries of one logical
//! request send identical payloads.
//!
//! Rules run in a fixed order:
//!
//! 1. Collapse whitespace runs to single spaces and drop blank lines.
//! 2. Route short or simple-task prompts to the cheapest model.
//! 3. Drop irrelevant user-context fields and truncate long context strings.
//! 4. Clamp the output budget and default the temperature.
//!
//! The cache key is derived from the request *before* these rules run.
//! Optimization only changes what is sent and billed.

mod context;

use crate::types::Request;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Prompts shorter than this many characters go to `cheap_model`.
    pub short_prompt_chars: usize,
    /// Case-insensitive phrases that mark a prompt as a simple task.
    pub simple_task_markers: Vec<String>,
    pub cheap_model: String,
    pub drop_context_fields: Vec<String>,
    pub max_context_field_chars: usize,
    pub truncation_marker: String,
    pub max_output_tokens: u32,
    pub default_temperature: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            short_prompt_chars: 100,
            simple_task_markers: [
                "summarize",
                "summary",
                "yes or no",
                "true or false",
                "in one word",
                "in one sentence",
                "briefly",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            cheap_model: "gemini-1.5-flash-8b".into(),
            drop_context_fields: [
                "createdAt",
                "updatedAt",
                "created_at",
                "updated_at",
                "lastModified",
                "metadata",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_context_field_chars: 500,
            truncation_marker: "...[truncated]".into(),
            max_output_tokens: 2048,
            default_temperature: 0.7,
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_cheap_model(mut self, model: impl Into<String>) -> Self {
        self.cheap_model = model.into();
        self
    }
    pub fn with_short_prompt_chars(mut self, chars: usize) -> Self {
        self.short_prompt_chars = chars;
        self
    }
    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }
    pub fn with_default_temperature(mut self, t: f32) -> Self {
        self.default_temperature = t;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RequestOptimizer {
    config: OptimizerConfig,
    markers: Vec<String>,
}

impl RequestOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        let markers = config
            .simple_task_markers
            .iter()
            .map(|m| m.to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        Self { config, markers }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn optimize(&self, request: &Request) -> Request {
        let mut out = request.clone();

        out.prompt = collapse_whitespace(&request.prompt);

        if self.is_simple(&out.prompt) && out.model != self.config.cheap_model {
            tracing::debug!(
                requested = out.model.as_str(),
                routed = self.config.cheap_model.as_str(),
                "routing simple prompt to cheap model"
            );
            out.model = self.config.cheap_model.clone();
        }

        if let Some(ctx) = &request.user_context {
            out.user_context = Some(context::prune_context(
                ctx,
                &self.config.drop_context_fields,
                self.config.max_context_field_chars,
                &self.config.truncation_marker,
            ));
        }

        let ceiling = self.config.max_output_tokens;
        out.config.max_output_tokens = Some(
            request
                .config
                .max_output_tokens
                .map_or(ceiling, |m| m.min(ceiling)),
        );
        if out.config.temperature.is_none() {
            out.config.temperature = Some(self.config.default_temperature);
        }

        out
    }

    fn is_simple(&self, prompt: &str) -> bool {
        if prompt.chars().count() < self.config.short_prompt_chars {
            return true;
        }
        let lower = prompt.to_lowercase();
        self.markers.iter().any(|m| lower.contains(m.as_str()))
    }
}

impl Default for RequestOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

fn collapse_whitespace(prompt: &str) -> String {
    prompt
        .lines()
        .map(|line| WHITESPACE_RUN.replace_all(line.trim(), " "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
