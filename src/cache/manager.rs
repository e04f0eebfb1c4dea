//! Response cache: category TTLs and statistics over a pluggable backend.

use super::backend::{CacheBackend, CacheEntry, MemoryCache};
use super::key::CacheKey;
use crate::types::CacheCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    /// Per-category TTL overrides in seconds; unlisted categories use their built-in TTL.
    pub category_ttl_secs: BTreeMap<CacheCategory, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 100,
            category_ttl_secs: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }
    pub fn with_ttl(mut self, category: CacheCategory, ttl: Duration) -> Self {
        self.category_ttl_secs.insert(category, ttl.as_secs());
        self
    }
    pub fn ttl_for(&self, category: CacheCategory) -> Duration {
        self.category_ttl_secs
            .get(&category)
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or_else(|| category.default_ttl())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    errors: AtomicU64,
}
impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Content-addressed response store shared by every in-flight request.
///
/// Backend failures are never surfaced: a failed read is a miss and a failed write
/// is dropped, both counted in [`CacheStats::errors`].
pub struct ResponseCache {
    config: CacheConfig,
    backend: Box<dyn CacheBackend>,
    stats: AtomicStats,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, backend: Box<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            stats: AtomicStats::new(),
        }
    }

    /// In-memory LRU cache sized from the config.
    pub fn in_memory(config: CacheConfig) -> Self {
        let backend = MemoryCache::new(config.max_entries);
        Self::new(config, Box::new(backend))
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        if !self.config.enabled {
            return None;
        }
        match self.backend.get(key).await {
            Ok(Some(entry)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(cache_key = key.short(), "cache hit");
                Some(entry)
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(cache_key = key.short(), "cache miss");
                None
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(cache_key = key.short(), error = %e, backend = self.backend.name(), "cache read failed");
                None
            }
        }
    }

    /// Store `entry` under `key`, with the entry's TTL taken from `category`.
    pub async fn put(&self, key: &CacheKey, category: CacheCategory, mut entry: CacheEntry) {
        if !self.config.enabled {
            return;
        }
        entry.ttl = self.config.ttl_for(category);
        match self.backend.put(key, entry).await {
            Ok(()) => {
                self.stats.puts.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(cache_key = key.short(), error = %e, backend = self.backend.name(), "cache write failed");
            }
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.backend.clear().await {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, backend = self.backend.name(), "cache clear failed");
        } else {
            tracing::info!(backend = self.backend.name(), "response cache cleared");
        }
    }

    pub async fn len(&self) -> usize {
        self.backend.len().await.unwrap_or(0)
    }

    pub fn ttl_for(&self, category: CacheCategory) -> Duration {
        self.config.ttl_for(category)
    }
    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}
