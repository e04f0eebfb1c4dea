use super::builder::RequestManagerBuilder;
use crate::cache::{CacheKeyGenerator, CacheStats, ResponseCache};
use crate::config::ManagerConfig;
use crate::dispatch::{DispatchJob, Dispatcher, RetryPolicy};
use crate::types::{GenerateOptions, GenerationResult, Request};
use crate::upstream::InferenceBackend;
use crate::usage::{UsageAccountant, UsageStats};
use crate::Result;
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub(crate) struct ManagerInner {
    pub(crate) keys: CacheKeyGenerator,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) usage: Arc<UsageAccountant>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) retry: RetryPolicy,
}

/// Single entry point for generation requests.
///
/// Cloning is cheap and every clone shares the same cache, queue and counters.
/// Create one per application context and pass it to whoever needs it.
#[derive(Clone)]
pub struct RequestManager {
    inner: Arc<ManagerInner>,
}

/// Outcome counts of a [`RequestManager::preload`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl RequestManager {
    pub fn builder() -> RequestManagerBuilder {
        RequestManagerBuilder::new()
    }

    /// Build a manager with `config` and the in-memory cache.
    pub fn new(config: ManagerConfig, upstream: Arc<dyn InferenceBackend>) -> Result<Self> {
        RequestManagerBuilder::new()
            .config(config)
            .upstream(upstream)
            .build()
    }

    pub(crate) fn from_inner(inner: ManagerInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Serve `request` from cache, or dispatch it by priority and cache the result.
    pub async fn generate(
        &self,
        request: Request,
        options: GenerateOptions,
    ) -> Result<GenerationResult> {
        request.validate()?;
        let inner = &self.inner;
        let category = options.effective_category(&request);
        let cache_key = inner.keys.generate(&request, category);

        if let Some(entry) = inner.cache.get(&cache_key).await {
            inner.usage.record_cache_hit();
            tracing::debug!(
                cache_key = cache_key.short(),
                category = %category,
                age_ms = entry.age().as_millis() as u64,
                "served from cache"
            );
            return Ok(GenerationResult {
                payload: entry.payload,
                model_used: entry.model_used,
                tokens_used: entry.tokens_used,
                cost: 0.0,
                cached: true,
            });
        }

        let job = DispatchJob {
            request,
            cache_key,
            category,
            max_attempts: inner.retry.max_attempts(options.max_retries),
        };
        inner.dispatcher.dispatch(job, options.priority).await
    }

    /// Warm the cache with low-priority requests in the background.
    ///
    /// Individual failures are logged and counted, never propagated. The returned
    /// handle can be awaited for the counts or simply dropped.
    pub fn preload(&self, requests: Vec<Request>) -> JoinHandle<PreloadReport> {
        let manager = self.clone();
        tokio::spawn(async move {
            let total = requests.len();
            let outcomes = join_all(
                requests
                    .into_iter()
                    .map(|request| manager.generate(request, GenerateOptions::low())),
            )
            .await;

            let mut report = PreloadReport::default();
            for outcome in outcomes {
                match outcome {
                    Ok(_) => report.succeeded += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(error = %e, "preload request failed");
                    }
                }
            }
            tracing::info!(total, succeeded = report.succeeded, failed = report.failed, "preload finished");
            report
        })
    }

    pub fn stats(&self) -> UsageStats {
        self.inner.usage.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub async fn cached_entries(&self) -> usize {
        self.inner.cache.len().await
    }

    /// Drop every cached response.
    pub async fn clear_cache(&self) {
        self.inner.cache.clear().await;
    }

    pub fn queue_len(&self) -> usize {
        self.inner.dispatcher.queue_len()
    }

    /// Drain one batch immediately instead of waiting for the next tick.
    pub async fn flush(&self) {
        self.inner.dispatcher.flush().await;
    }

    /// Stop the queue worker; still-queued requests fail with `DispatcherClosed`.
    pub async fn shutdown(&self) {
        self.inner.dispatcher.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CacheCategory;
    use crate::upstream::{FnBackend, UpstreamResponse};
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_manager() -> (RequestManager, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let upstream = Arc::new(FnBackend::new(move |req: Request| {
            c.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, anyhow::Error>(UpstreamResponse::text(format!("re: {}", req.prompt))) }
        }));
        (RequestManager::new(ManagerConfig::default(), upstream).unwrap(), calls)
    }

    #[test]
    fn test_builder_requires_upstream() {
        let err = RequestManager::builder().build().err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_dispatched() {
        let (manager, calls) = counting_manager();
        let err = manager
            .generate(Request::new("", "fast"), GenerateOptions::high())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_category_override_changes_key() {
        let (manager, calls) = counting_manager();
        let req = Request::new("list 3 breakfasts", "fast");
        manager
            .generate(req.clone(), GenerateOptions::high().with_category(CacheCategory::Recipe))
            .await
            .unwrap();
        manager
            .generate(req.clone(), GenerateOptions::high().with_category(CacheCategory::Nutrition))
            .await
            .unwrap();
        let hit = manager
            .generate(req, GenerateOptions::high().with_category(CacheCategory::Recipe))
            .await
            .unwrap();
        assert!(hit.cached);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.cached_entries().await, 2);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let (manager, calls) = counting_manager();
        let other = manager.clone();
        manager
            .generate(Request::new("hi", "fast"), GenerateOptions::high())
            .await
            .unwrap();
        let res = other
            .generate(Request::new("hi", "fast"), GenerateOptions::high())
            .await
            .unwrap();
        assert!(res.cached);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(other.stats().cache_hits, 1);
    }
}
