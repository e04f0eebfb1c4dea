//! # ai-lib-gateway
//!
//! 面向生成式推理服务的请求缓存、优化与调度层。
//!
//! Request caching, optimization and dispatch for costly, latency-variable
//! generative inference services.
//!
//! ## Overview
//!
//! The gateway sits between application code and the inference provider. It
//! avoids redundant upstream calls, smooths bursty demand, bounds per-call
//! token spend and keeps callers responsive when the provider is slow,
//! rate-limited or failing transiently.
//!
//! ## Data Flow
//!
//! ```text
//! caller -> RequestManager::generate
//!        -> cache lookup (key of the original request)
//!           hit  -> cached payload, hit counter += 1
//!           miss -> RequestOptimizer -> Dispatcher (inline or queued)
//!                -> upstream call, retried with backoff
//!                -> UsageAccountant + ResponseCache (category TTL)
//!        -> result
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`manager`] | [`RequestManager`] facade and its builder |
//! | [`cache`] | Content addressing and the LRU response cache |
//! | [`optimizer`] | Request shaping before dispatch |
//! | [`dispatch`] | Priority routing, drain worker and retry policy |
//! | [`batch`] | FIFO batch queue and concurrent batch executor |
//! | [`usage`] | Request, token, cost and latency accounting |
//! | [`tokens`] | Token estimation and model pricing |
//! | [`upstream`] | The outbound inference collaborator trait |
//! | [`config`] | Gateway configuration and YAML loading |
//! | [`types`] | Requests, options and results |

pub mod batch;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod manager;
pub mod optimizer;
pub mod tokens;
pub mod types;
pub mod upstream;
pub mod usage;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

pub use config::ManagerConfig;
pub use manager::{PreloadReport, RequestManager, RequestManagerBuilder};
pub use types::{CacheCategory, GenerateOptions, GenerationConfig, GenerationResult, Priority, Request};
pub use upstream::{FnBackend, InferenceBackend, UpstreamResponse};
pub use usage::UsageStats;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common imports for applications using the gateway.
pub mod prelude {
    pub use crate::config::ManagerConfig;
    pub use crate::manager::{PreloadReport, RequestManager, RequestManagerBuilder};
    pub use crate::types::{CacheCategory, GenerateOptions, GenerationResult, Priority, Request};
    pub use crate::upstream::{FnBackend, InferenceBackend, UpstreamResponse};
    pub use crate::usage::UsageStats;
}
