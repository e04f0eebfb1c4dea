//! 响应缓存模块：按内容寻址的 LRU 缓存，支持按类别设置过期时间。
//!
//! # Response Caching Module
//!
//! Content-addressed response caching. Identical requests resolve to the same
//! [`CacheKey`], and a stored response is served until its category's TTL runs out.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheKeyGenerator`] | SHA-256 content address over a canonical request form |
//! | [`ResponseCache`] | Category TTLs, statistics and error isolation over a backend |
//! | [`CacheConfig`] | Capacity, enable flag and TTL overrides |
//! | [`CacheBackend`] | Trait for implementing custom cache backends |
//! | [`MemoryCache`] | In-memory LRU backend with a fixed entry budget |
//! | [`NullCache`] | No-op backend for disabling caching |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_gateway::cache::{CacheConfig, CacheKeyGenerator, ResponseCache};
//! use ai_lib_gateway::types::{CacheCategory, Request};
//! use std::time::Duration;
//!
//! let config = CacheConfig::new()
//!     .with_max_entries(500)
//!     .with_ttl(CacheCategory::Recipe, Duration::from_secs(3600));
//! let cache = ResponseCache::in_memory(config);
//!
//! let request = Request::new("list 3 breakfasts", "fast");
//! let key = CacheKeyGenerator::new().generate(&request, CacheCategory::Recipe);
//! assert_eq!(key.as_str().len(), 64);
//! assert_eq!(cache.ttl_for(CacheCategory::Recipe), Duration::from_secs(3600));
//! ```
//!
//! ## Expiry
//!
//! TTLs are enforced when an entry is read. Nothing sweeps the cache in the
//! background; expired entries are dropped on their next access or evicted by LRU.

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, CacheEntry, MemoryCache, NullCache};
pub use key::{CacheKey, CacheKeyGenerator};
pub use manager::{CacheConfig, CacheStats, ResponseCache};
