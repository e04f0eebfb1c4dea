//! 网关配置：缓存、批处理、重试、优化与计费设置。
//!
//! Gateway configuration.
//!
//! Every section has working defaults, so a YAML file only needs the keys it
//! changes. Durations are written in milliseconds (`*_ms` keys).
//!
//! ```yaml
//! cache:
//!   max_entries: 500
//!   category_ttl_secs:
//!     recipe-suggestion: 600
//! batch:
//!   max_batch_size: 5
//!   tick_interval_ms: 2000
//! retry:
//!   max_retries: 3
//!   base_delay_ms: 1000
//! optimizer:
//!   cheap_model: gemini-1.5-flash-8b
//! ```

use crate::batch::BatchConfig;
use crate::cache::CacheConfig;
use crate::dispatch::RetryConfig;
use crate::optimizer::OptimizerConfig;
use crate::usage::UsageConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub retry: RetryConfig,
    pub optimizer: OptimizerConfig,
    pub usage: UsageConfig,
    /// Optional salt mixed into every cache key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_salt: Option<String>,
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ManagerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw).map_err(|e| match e {
            Error::Yaml(inner) => Error::configuration_with_context(
                inner.to_string(),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_origin("config_loader"),
            ),
            other => other,
        })
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }
    pub fn with_usage(mut self, usage: UsageConfig) -> Self {
        self.usage = usage;
        self
    }
    pub fn with_key_salt(mut self, salt: impl Into<String>) -> Self {
        self.key_salt = Some(salt.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(invalid("cache.max_entries", "must be at least 1"));
        }
        self.batch.validate()?;
        if self.retry.max_retries == 0 {
            return Err(invalid("retry.max_retries", "must be at least 1"));
        }
        if self.optimizer.cheap_model.trim().is_empty() {
            return Err(invalid("optimizer.cheap_model", "must not be empty"));
        }
        if !(self.usage.chars_per_token.is_finite() && self.usage.chars_per_token > 0.0) {
            return Err(invalid("usage.chars_per_token", "must be a positive number"));
        }
        Ok(())
    }
}

fn invalid(field: &str, details: &str) -> Error {
    Error::configuration_with_context(
        format!("invalid value for {}", field),
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_origin("config_validator"),
    )
}

/// Serde adapter for `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Serde adapter for `Option<Duration>` as integer milliseconds.
pub(crate) mod duration_ms_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
