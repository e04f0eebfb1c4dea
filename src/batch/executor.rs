//! Concurrent execution of one drained batch.

use super::collector::BatchItem;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// A batch item whose job returned an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("batch item {position} failed: {reason}")]
pub struct ItemFailure {
    /// Position of the item within its batch.
    pub position: usize,
    pub reason: String,
}

/// What happened to each item of one batch.
#[derive(Debug, Clone)]
pub struct BatchReport<T> {
    pub completed: Vec<(usize, T)>,
    pub failed: Vec<ItemFailure>,
    pub elapsed: Duration,
    pub size: usize,
}

impl<T> BatchReport<T> {
    /// Report for a cycle that found nothing to run.
    pub fn empty() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
            elapsed: Duration::ZERO,
            size: 0,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.completed.len()
    }

    pub fn failures(&self) -> usize {
        self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Runs every item of a batch concurrently; one item's failure never affects the others.
#[derive(Debug, Clone, Default)]
pub struct BatchExecutor;

impl BatchExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Start `job` for every item at once and wait for all of them.
    ///
    /// A job that panics is reported as that item's failure.
    pub async fn run_batch<T, R, E, F, Fut>(&self, items: Vec<BatchItem<T>>, job: F) -> BatchReport<R>
    where
        F: Fn(BatchItem<T>) -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: std::fmt::Display,
    {
        let started = Instant::now();
        let size = items.len();
        let outcomes = join_all(
            items
                .into_iter()
                .map(|item| AssertUnwindSafe(job(item)).catch_unwind()),
        )
        .await;

        let mut report = BatchReport::empty();
        report.size = size;
        for (position, outcome) in outcomes.into_iter().enumerate() {
            let reason = match outcome {
                Ok(Ok(value)) => {
                    report.completed.push((position, value));
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };
            report.failed.push(ItemFailure { position, reason });
        }
        report.elapsed = started.elapsed();
        report
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
