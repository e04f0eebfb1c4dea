//! Cache backend implementations.

use super::key::CacheKey;
use crate::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// A stored response. Never mutated after insertion; updates replace the whole entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub payload: String,
    pub stored_at: Instant,
    pub ttl: Duration,
    pub tokens_used: u64,
    pub model_used: String,
}

impl CacheEntry {
    pub fn new(
        payload: impl Into<String>,
        model_used: impl Into<String>,
        tokens_used: u64,
        ttl: Duration,
    ) -> Self {
        Self {
            payload: payload.into(),
            stored_at: Instant::now(),
            ttl,
            tokens_used,
            model_used: model_used.into(),
        }
    }
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }
    pub fn is_expired(&self) -> bool {
        self.age() > self.ttl
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;
    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()>;
    async fn remove(&self, key: &CacheKey) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

/// In-process LRU store with a fixed entry budget.
///
/// Expiry is checked on read only; an expired entry lingers (and counts toward
/// capacity) until it is read or evicted.
pub struct MemoryCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    capacity: NonZeroUsize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
        }
    }
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let mut entries = self.lock();
        let expired = match entries.peek(key) {
            Some(entry) => entry.is_expired(),
            None => return Ok(None),
        };
        if expired {
            entries.pop(key);
            tracing::debug!(cache_key = key.short(), "dropped expired cache entry");
            return Ok(None);
        }
        // `get` promotes the entry to most-recently-used.
        Ok(entries.get(key).cloned())
    }
    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
        let mut entries = self.lock();
        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            if &evicted != key {
                tracing::debug!(evicted = evicted.short(), "evicted least-recently-used entry");
            }
        }
        Ok(())
    }
    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.lock().pop(key).is_some())
    }
    async fn clear(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(self.lock().len())
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}

pub struct NullCache;
impl NullCache {
    pub fn new() -> Self {
        Self
    }
}
impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(None)
    }
    async fn put(&self, _: &CacheKey, _: CacheEntry) -> Result<()> {
        Ok(())
    }
    async fn remove(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
