//! FIFO batch queue.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum entries drained per tick.
    pub max_batch_size: usize,
    /// Fixed drain interval, independent of arrivals.
    #[serde(with = "crate::config::duration_ms", rename = "tick_interval_ms")]
    pub tick_interval: Duration,
}
impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 5,
            tick_interval: Duration::from_secs(2),
        }
    }
}
impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_batch_size(mut self, s: usize) -> Self {
        self.max_batch_size = s;
        self
    }
    pub fn with_tick_interval(mut self, d: Duration) -> Self {
        self.tick_interval = d;
        self
    }

    /// A zero batch size would never drain and a zero interval cannot tick.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(invalid("batch.max_batch_size", "must be at least 1"));
        }
        if self.tick_interval.is_zero() {
            return Err(invalid("batch.tick_interval_ms", "must be greater than zero"));
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
            .with_origin("batch_config"),
    )
}

#[derive(Debug)]
pub struct BatchItem<T> {
    pub data: T,
    pub added_at: Instant,
    pub request_id: String,
}
impl<T> BatchItem<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            added_at: Instant::now(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = id.into();
        self
    }
    /// Time spent waiting in the queue so far.
    pub fn waited(&self) -> Duration {
        self.added_at.elapsed()
    }
}

/// Unbounded FIFO drained from the head in batches.
pub struct BatchQueue<T> {
    items: Mutex<VecDeque<BatchItem<T>>>,
}

impl<T> BatchQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Append an item; returns the queue length after the push.
    pub fn push(&self, item: BatchItem<T>) -> usize {
        let mut items = self.lock();
        items.push_back(item);
        items.len()
    }

    /// Remove up to `max` items from the head, oldest first.
    pub fn take_batch(&self, max: usize) -> Vec<BatchItem<T>> {
        let mut items = self.lock();
        let n = max.min(items.len());
        items.drain(..n).collect()
    }

    pub fn drain_all(&self) -> Vec<BatchItem<T>> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<BatchItem<T>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for BatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
