use super::core::{ManagerInner, RequestManager};
use crate::cache::{CacheBackend, CacheKeyGenerator, MemoryCache, ResponseCache};
use crate::config::ManagerConfig;
use crate::dispatch::{Dispatcher, RetryPolicy};
use crate::optimizer::RequestOptimizer;
use crate::upstream::InferenceBackend;
use crate::usage::UsageAccountant;
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;

/// Builder for creating a [`RequestManager`].
///
/// Only the upstream backend is required; everything else has defaults.
pub struct RequestManagerBuilder {
    config: ManagerConfig,
    upstream: Option<Arc<dyn InferenceBackend>>,
    cache_backend: Option<Box<dyn CacheBackend>>,
}

impl RequestManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
            upstream: None,
            cache_backend: None,
        }
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the inference collaborator every cache miss is sent to.
    pub fn upstream(mut self, upstream: Arc<dyn InferenceBackend>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Replace the in-memory LRU backend (e.g. with a shared store, or `NullCache`).
    pub fn cache_backend(mut self, backend: Box<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<RequestManager> {
        self.config.validate()?;
        let upstream = self.upstream.ok_or_else(|| {
            Error::configuration_with_context(
                "an upstream inference backend is required",
                ErrorContext::new()
                    .with_field_path("upstream")
                    .with_origin("request_manager_builder"),
            )
        })?;

        let config = self.config;
        let backend = self
            .cache_backend
            .unwrap_or_else(|| Box::new(MemoryCache::new(config.cache.max_entries)));
        let cache = Arc::new(ResponseCache::new(config.cache.clone(), backend));
        let usage = Arc::new(UsageAccountant::new(config.usage.clone()));
        let retry = RetryPolicy::new(config.retry.clone());
        let dispatcher = Dispatcher::new(
            upstream.clone(),
            RequestOptimizer::new(config.optimizer.clone()),
            cache.clone(),
            usage.clone(),
            retry.clone(),
            config.batch.clone(),
        )?;
        let keys = match &config.key_salt {
            Some(salt) => CacheKeyGenerator::new().with_salt(salt.clone()),
            None => CacheKeyGenerator::new(),
        };

        tracing::debug!(
            upstream = upstream.name(),
            cache_backend = cache.backend_name(),
            max_entries = config.cache.max_entries,
            batch_size = config.batch.max_batch_size,
            "request manager ready"
        );

        Ok(RequestManager::from_inner(ManagerInner {
            keys,
            cache,
            usage,
            dispatcher,
            retry,
        }))
    }
}

impl Default for RequestManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
