//! Priority dispatch: inline execution for high priority, batched queue otherwise.

use super::retry::RetryPolicy;
use crate::batch::{panic_message, BatchConfig, BatchExecutor, BatchItem, BatchQueue, BatchReport};
use crate::cache::{CacheEntry, CacheKey, ResponseCache};
use crate::optimizer::RequestOptimizer;
use crate::types::{CacheCategory, GenerationResult, Priority, Request};
use crate::upstream::{InferenceBackend, UpstreamResponse};
use crate::usage::UsageAccountant;
use crate::{Error, Result};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// One logical request, ready to run.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    /// The request as the caller built it; optimized afresh on every attempt.
    pub request: Request,
    /// Address computed from the pre-optimization request.
    pub cache_key: CacheKey,
    pub category: CacheCategory,
    pub max_attempts: u32,
}

/// A queued job and the sink its single waiter listens on.
pub struct QueueEntry {
    pub job: DispatchJob,
    completion: oneshot::Sender<Result<GenerationResult>>,
}

impl QueueEntry {
    fn new(job: DispatchJob) -> (Self, PendingResult) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                job,
                completion: tx,
            },
            PendingResult { rx },
        )
    }

    /// Fill the completion sink. Consumes the entry, so it can only happen once.
    pub fn resolve(self, result: Result<GenerationResult>) {
        if self.completion.send(result).is_err() {
            tracing::debug!(
                cache_key = self.job.cache_key.short(),
                "waiter dropped before queued request finished"
            );
        }
    }
}

/// Future returned for queued requests.
///
/// Resolves exactly once with the entry's terminal outcome, or with
/// [`Error::DispatcherClosed`] if the entry was discarded at shutdown.
#[must_use = "a queued request still runs if dropped, but its result is lost"]
pub struct PendingResult {
    rx: oneshot::Receiver<Result<GenerationResult>>,
}

impl Future for PendingResult {
    type Output = Result<GenerationResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| match r {
            Ok(result) => result,
            Err(_) => Err(Error::DispatcherClosed),
        })
    }
}

/// Everything one execution needs: shared by the inline path and the drain worker.
pub(crate) struct DispatchCore {
    upstream: Arc<dyn InferenceBackend>,
    optimizer: RequestOptimizer,
    cache: Arc<ResponseCache>,
    usage: Arc<UsageAccountant>,
    retry: RetryPolicy,
}

impl DispatchCore {
    /// Optimize, call upstream, retry with backoff; on success account and cache.
    async fn execute(&self, job: &DispatchJob) -> Result<GenerationResult> {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let optimized = self.optimizer.optimize(&job.request);
            match self.upstream.call(&optimized).await {
                Ok(response) => {
                    return Ok(self
                        .complete(job, &optimized, response, attempt, started.elapsed())
                        .await);
                }
                Err(e) => match self.retry.next_delay(attempt, job.max_attempts) {
                    Some(delay) => {
                        tracing::warn!(
                            cache_key = job.cache_key.short(),
                            attempt,
                            max_attempts = job.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "upstream call failed; retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            cache_key = job.cache_key.short(),
                            attempts = attempt,
                            error = %e,
                            "upstream call failed; retries exhausted"
                        );
                        self.usage.record_failure();
                        return Err(Error::Upstream {
                            attempts: attempt,
                            source: e,
                        });
                    }
                },
            }
        }
    }

    async fn complete(
        &self,
        job: &DispatchJob,
        sent: &Request,
        response: UpstreamResponse,
        attempts: u32,
        elapsed: Duration,
    ) -> GenerationResult {
        let model_used = response.model.unwrap_or_else(|| sent.model.clone());
        let tokens = self.usage.estimate_tokens(&sent.prompt, &response.text);
        let cost = self.usage.estimate_cost(&model_used, tokens);
        self.usage.record(tokens, cost, elapsed);

        let entry = CacheEntry::new(
            response.text.clone(),
            model_used.clone(),
            tokens,
            self.cache.ttl_for(job.category),
        );
        self.cache.put(&job.cache_key, job.category, entry).await;

        tracing::info!(
            cache_key = job.cache_key.short(),
            category = %job.category,
            model = model_used.as_str(),
            tokens,
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            "upstream call completed"
        );

        GenerationResult {
            payload: response.text,
            model_used,
            tokens_used: tokens,
            cost,
            cached: false,
        }
    }
}

/// Drains the queue in bounded batches, one cycle at a time.
pub(crate) struct BatchDrainer {
    core: Arc<DispatchCore>,
    queue: BatchQueue<QueueEntry>,
    executor: BatchExecutor,
    config: BatchConfig,
    busy: AtomicBool,
    cycle_done: Notify,
}

impl BatchDrainer {
    /// Run one drain cycle unless another is in flight.
    ///
    /// Returns `None` when skipped because a cycle is already running.
    async fn run_cycle(&self) -> Option<BatchReport<u64>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("drain cycle already running; skipping");
            return None;
        }
        let _cycle = CycleGuard { drainer: self };

        let batch = self.queue.take_batch(self.config.max_batch_size);
        let result = if batch.is_empty() {
            BatchReport::empty()
        } else {
            let remaining = self.queue.len();
            tracing::info!(batch_size = batch.len(), remaining, "draining request queue");
            let result = self
                .executor
                .run_batch(batch, |item: BatchItem<QueueEntry>| async move {
                    tracing::debug!(
                        request_id = item.request_id.as_str(),
                        waited_ms = item.waited().as_millis() as u64,
                        "executing queued request"
                    );
                    let entry = item.data;
                    let outcome = match AssertUnwindSafe(self.core.execute(&entry.job))
                        .catch_unwind()
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            tracing::error!(
                                cache_key = entry.job.cache_key.short(),
                                panic = message.as_str(),
                                "queued request panicked"
                            );
                            self.core.usage.record_failure();
                            Err(Error::Panicked { message })
                        }
                    };
                    let summary = match &outcome {
                        Ok(r) => Ok(r.tokens_used),
                        Err(e) => Err(e.to_string()),
                    };
                    entry.resolve(outcome);
                    summary
                })
                .await;
            tracing::info!(
                succeeded = result.succeeded(),
                failed = result.failures(),
                elapsed_ms = result.elapsed.as_millis() as u64,
                "drain cycle finished"
            );
            result
        };
        Some(result)
    }

    async fn wait_idle(&self) {
        loop {
            let done = self.cycle_done.notified();
            if !self.busy.load(Ordering::Acquire) {
                return;
            }
            done.await;
        }
    }

    /// Tick loop: first tick one interval after start, overdue ticks are skipped.
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.tick_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.busy.load(Ordering::Acquire) {
                        tracing::debug!(queued = self.queue.len(), "previous drain still running; tick skipped");
                        continue;
                    }
                    if self.queue.is_empty() {
                        continue;
                    }
                    let drainer = Arc::clone(&self);
                    tokio::spawn(async move {
                        drainer.run_cycle().await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("drain worker stopped");
    }
}

/// Clears the busy flag when a cycle ends, including by unwinding.
struct CycleGuard<'a> {
    drainer: &'a BatchDrainer,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.drainer.busy.store(false, Ordering::Release);
        self.drainer.cycle_done.notify_waiters();
    }
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Worker handle and closed flag, guarded together so enqueue and shutdown cannot interleave.
#[derive(Default)]
struct WorkerSlot {
    worker: Option<Worker>,
    closed: bool,
}

/// Routes jobs by priority and owns the drain worker.
pub struct Dispatcher {
    core: Arc<DispatchCore>,
    drainer: Arc<BatchDrainer>,
    slot: Mutex<WorkerSlot>,
}

impl Dispatcher {
    pub fn new(
        upstream: Arc<dyn InferenceBackend>,
        optimizer: RequestOptimizer,
        cache: Arc<ResponseCache>,
        usage: Arc<UsageAccountant>,
        retry: RetryPolicy,
        batch: BatchConfig,
    ) -> Result<Self> {
        batch.validate()?;
        let core = Arc::new(DispatchCore {
            upstream,
            optimizer,
            cache,
            usage,
            retry,
        });
        let drainer = Arc::new(BatchDrainer {
            core: Arc::clone(&core),
            queue: BatchQueue::new(),
            executor: BatchExecutor::new(),
            config: batch,
            busy: AtomicBool::new(false),
            cycle_done: Notify::new(),
        });
        Ok(Self {
            core,
            drainer,
            slot: Mutex::new(WorkerSlot::default()),
        })
    }

    /// Run `job` on the path its priority selects and wait for the outcome.
    pub async fn dispatch(&self, job: DispatchJob, priority: Priority) -> Result<GenerationResult> {
        if priority.is_immediate() {
            self.execute_now(&job).await
        } else {
            self.enqueue(job)?.await
        }
    }

    /// Immediate path: runs in the caller's task, bypassing the queue.
    pub async fn execute_now(&self, job: &DispatchJob) -> Result<GenerationResult> {
        tracing::debug!(cache_key = job.cache_key.short(), "dispatching immediately");
        self.core.execute(job).await
    }

    /// Queued path: append to the FIFO and return the entry's future.
    pub fn enqueue(&self, job: DispatchJob) -> Result<PendingResult> {
        let mut slot = self.lock_slot();
        if slot.closed {
            return Err(Error::DispatcherClosed);
        }
        if slot.worker.is_none() {
            slot.worker = Some(self.start_worker());
        }
        let (entry, pending) = QueueEntry::new(job);
        let item = BatchItem::new(entry);
        tracing::debug!(
            request_id = item.request_id.as_str(),
            cache_key = item.data.job.cache_key.short(),
            "queued request"
        );
        self.drainer.queue.push(item);
        Ok(pending)
    }

    /// Run one drain cycle now. Returns `None` if a cycle was already running.
    pub async fn flush(&self) -> Option<BatchReport<u64>> {
        self.drainer.run_cycle().await
    }

    pub fn queue_len(&self) -> usize {
        self.drainer.queue.len()
    }

    /// Stop ticking, let the running cycle finish, and reject whatever is still queued.
    pub async fn shutdown(&self) {
        let worker = {
            let mut slot = self.lock_slot();
            slot.closed = true;
            slot.worker.take()
        };
        if let Some(worker) = worker {
            let _ = worker.shutdown.send(true);
            if let Err(e) = worker.handle.await {
                tracing::warn!(error = %e, "drain worker ended abnormally");
            }
        }
        self.drainer.wait_idle().await;

        let leftover = self.drainer.queue.drain_all();
        if !leftover.is_empty() {
            tracing::warn!(rejected = leftover.len(), "rejecting queued requests at shutdown");
        }
        for item in leftover {
            item.data.resolve(Err(Error::DispatcherClosed));
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, WorkerSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_worker(&self) -> Worker {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&self.drainer).run(rx));
        tracing::debug!(
            tick_ms = self.drainer.config.tick_interval.as_millis() as u64,
            batch_size = self.drainer.config.max_batch_size,
            "started drain worker"
        );
        Worker {
            handle,
            shutdown: tx,
        }
    }

    #[cfg(test)]
    fn has_worker(&self) -> bool {
        self.lock_slot().worker.is_some()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let worker = self
            .slot
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .worker
            .take();
        if let Some(worker) = worker {
            worker.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, CacheKeyGenerator};
    use crate::dispatch::RetryConfig;
    use crate::upstream::FnBackend;
    use std::sync::atomic::AtomicU32;

    fn job(prompt: &str, max_attempts: u32) -> DispatchJob {
        let request = Request::new(prompt, "gemini-1.5-pro");
        let cache_key = CacheKeyGenerator::new().generate(&request, CacheCategory::General);
        DispatchJob {
            request,
            cache_key,
            category: CacheCategory::General,
            max_attempts,
        }
    }

    fn dispatcher(upstream: Arc<dyn InferenceBackend>) -> (Dispatcher, Arc<ResponseCache>, Arc<UsageAccountant>) {
        let cache = Arc::new(ResponseCache::in_memory(CacheConfig::default()));
        let usage = Arc::new(UsageAccountant::default());
        let d = Dispatcher::new(
            upstream,
            RequestOptimizer::default(),
            cache.clone(),
            usage.clone(),
            RetryPolicy::new(RetryConfig::default()),
            BatchConfig::default(),
        )
        .unwrap();
        (d, cache, usage)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_populates_cache_under_original_key() {
        let upstream = Arc::new(FnBackend::new(|req: Request| async move {
            Ok::<_, anyhow::Error>(UpstreamResponse::text(format!("ok:{}", req.model)))
        }));
        let (d, cache, usage) = dispatcher(upstream);
        let job = job("  list   3 breakfasts ", 3);

        let res = d.dispatch(job.clone(), Priority::High).await.unwrap();
        // Short prompt was routed to the cheap model before sending.
        assert_eq!(res.payload, "ok:gemini-1.5-flash-8b");
        assert_eq!(res.model_used, "gemini-1.5-flash-8b");
        assert!(!res.cached);

        let stored = cache.get(&job.cache_key).await.unwrap();
        assert_eq!(stored.payload, res.payload);
        assert_eq!(stored.tokens_used, res.tokens_used);
        assert_eq!(usage.snapshot().total_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let upstream = Arc::new(FnBackend::new(move |_req: Request| {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(anyhow::anyhow!("transient {}", n))
                } else {
                    Ok(UpstreamResponse::text("third time lucky"))
                }
            }
        }));
        let (d, _, usage) = dispatcher(upstream);
        let start = Instant::now();

        let res = d.dispatch(job("hello", 3), Priority::High).await.unwrap();
        assert_eq!(res.payload, "third time lucky");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s after the first failure, 4s after the second.
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert_eq!(usage.snapshot().failed_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let upstream = Arc::new(FnBackend::new(move |_req: Request| {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err::<UpstreamResponse, _>(anyhow::anyhow!("failure {}", n)) }
        }));
        let (d, cache, usage) = dispatcher(upstream);
        let job = job("hello", 2);

        let err = d.dispatch(job.clone(), Priority::High).await.unwrap_err();
        assert_eq!(err.attempts(), Some(2));
        assert!(err.to_string().contains("failure 2"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.get(&job.cache_key).await.is_none());
        assert_eq!(usage.snapshot().failed_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_drains_fifo_batch() {
        let upstream = Arc::new(FnBackend::new(|req: Request| async move {
            Ok::<_, anyhow::Error>(UpstreamResponse::text(req.prompt))
        }));
        let (d, _, _) = dispatcher(upstream);
        let pending: Vec<_> = (0..7)
            .map(|i| d.enqueue(job(&format!("q{i}"), 1)).unwrap())
            .collect();
        assert_eq!(d.queue_len(), 7);

        let first = d.flush().await.unwrap();
        assert_eq!(first.size, 5);
        assert_eq!(d.queue_len(), 2);

        let mut results = Vec::new();
        for p in pending {
            results.push(p.await.unwrap().payload);
        }
        assert_eq!(results, vec!["q0", "q1", "q2", "q3", "q4", "q5", "q6"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sibling_failure_is_isolated() {
        let upstream = Arc::new(FnBackend::new(|req: Request| async move {
            if req.prompt == "bad" {
                Err(anyhow::anyhow!("rejected"))
            } else {
                Ok(UpstreamResponse::text("fine"))
            }
        }));
        let (d, _, _) = dispatcher(upstream);
        let good = d.enqueue(job("good", 1)).unwrap();
        let bad = d.enqueue(job("bad", 1)).unwrap();

        let result = d.flush().await.unwrap();
        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.failures(), 1);
        assert_eq!(good.await.unwrap().payload, "fine");
        assert!(matches!(bad.await, Err(Error::Upstream { attempts: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycle_is_skipped() {
        let upstream = Arc::new(FnBackend::new(|_req: Request| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, anyhow::Error>(UpstreamResponse::text("slow"))
        }));
        let (d, _, _) = dispatcher(upstream);
        let d = Arc::new(d);
        let p = d.enqueue(job("a", 1)).unwrap();

        let running = {
            let d = d.clone();
            tokio::spawn(async move { d.flush().await })
        };
        tokio::task::yield_now().await;
        assert!(d.flush().await.is_none());

        assert!(running.await.unwrap().is_some());
        assert_eq!(p.await.unwrap().payload, "slow");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_queued_entries() {
        let upstream = Arc::new(FnBackend::new(|_req: Request| async move {
            Ok::<_, anyhow::Error>(UpstreamResponse::text("never"))
        }));
        let (d, _, _) = dispatcher(upstream);
        let pending = d.enqueue(job("a", 1)).unwrap();
        d.shutdown().await;

        assert!(matches!(pending.await, Err(Error::DispatcherClosed)));
        assert!(matches!(d.enqueue(job("b", 1)), Err(Error::DispatcherClosed)));
        assert_eq!(d.queue_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_entry_resolves_and_frees_the_drainer() {
        let upstream = Arc::new(FnBackend::new(|req: Request| async move {
            if req.prompt == "boom" {
                panic!("provider client crashed");
            }
            Ok::<_, anyhow::Error>(UpstreamResponse::text(req.prompt))
        }));
        let (d, _, usage) = dispatcher(upstream);
        let boom = d.enqueue(job("boom", 1)).unwrap();
        let sibling = d.enqueue(job("sibling", 1)).unwrap();

        let report = d.flush().await.unwrap();
        assert_eq!(report.succeeded(), 1);
        assert!(matches!(
            boom.await,
            Err(Error::Panicked { message }) if message == "provider client crashed"
        ));
        assert_eq!(sibling.await.unwrap().payload, "sibling");
        assert_eq!(usage.snapshot().failed_requests, 1);

        // The ticker keeps draining after the panic.
        let later = d.enqueue(job("later", 1)).unwrap();
        let res = tokio::time::timeout(Duration::from_secs(60), later)
            .await
            .expect("queued entry was never drained");
        assert_eq!(res.unwrap().payload, "later");
        assert_eq!(d.queue_len(), 0);
    }

    #[test]
    fn test_new_rejects_invalid_batch_config() {
        let upstream: Arc<dyn InferenceBackend> = Arc::new(FnBackend::new(|req: Request| async move {
            Ok::<_, anyhow::Error>(UpstreamResponse::text(req.prompt))
        }));
        for batch in [
            BatchConfig::new().with_tick_interval(Duration::ZERO),
            BatchConfig::new().with_max_batch_size(0),
        ] {
            let result = Dispatcher::new(
                upstream.clone(),
                RequestOptimizer::default(),
                Arc::new(ResponseCache::in_memory(CacheConfig::default())),
                Arc::new(UsageAccountant::default()),
                RetryPolicy::new(RetryConfig::default()),
                batch,
            );
            assert!(matches!(result, Err(Error::Configuration { .. })));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_enqueue_racing_shutdown_leaves_no_worker() {
        let upstream = Arc::new(FnBackend::new(|req: Request| async move {
            Ok::<_, anyhow::Error>(UpstreamResponse::text(req.prompt))
        }));
        let (d, _, _) = dispatcher(upstream);
        let d = Arc::new(d);

        let enqueuers: Vec<_> = (0..32)
            .map(|i| {
                let d = d.clone();
                tokio::spawn(async move { d.enqueue(job(&format!("r{i}"), 1)) })
            })
            .collect();
        let closer = {
            let d = d.clone();
            tokio::spawn(async move { d.shutdown().await })
        };
        closer.await.unwrap();

        for handle in enqueuers {
            match handle.await.unwrap() {
                Ok(pending) => {
                    let outcome = tokio::time::timeout(Duration::from_secs(5), pending)
                        .await
                        .expect("accepted entry never resolved");
                    assert!(matches!(outcome, Err(Error::DispatcherClosed)));
                }
                Err(e) => assert!(matches!(e, Error::DispatcherClosed)),
            }
        }
        assert!(!d.has_worker());
        assert_eq!(d.queue_len(), 0);
        assert!(matches!(d.enqueue(job("late", 1)), Err(Error::DispatcherClosed)));
    }
}
