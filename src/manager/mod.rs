//! 请求管理门面：调用方唯一的入口，先查缓存，未命中再交给调度器。
//!
//! # Request Manager
//!
//! [`RequestManager`] is the facade callers use. `generate` always reads the
//! cache first; a hit returns the stored payload without touching the
//! dispatcher, a miss is dispatched by priority and cached on success.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ai_lib_gateway::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ai_lib_gateway::Result<()> {
//!     let upstream = Arc::new(FnBackend::new(|req: Request| async move {
//!         Ok::<_, anyhow::Error>(UpstreamResponse::text(format!("answer to {}", req.prompt)))
//!     }));
//!     let manager = RequestManager::new(ManagerConfig::default(), upstream)?;
//!
//!     let request = Request::new("list 3 breakfasts", "gemini-1.5-flash")
//!         .with_category(CacheCategory::RecipeSuggestion);
//!     let first = manager.generate(request.clone(), GenerateOptions::high()).await?;
//!     let second = manager.generate(request, GenerateOptions::high()).await?;
//!     assert!(second.cached);
//!     assert_eq!(first.payload, second.payload);
//!     println!("{:?}", manager.stats());
//!     Ok(())
//! }
//! ```

mod builder;
mod core;

pub use self::builder::RequestManagerBuilder;
pub use self::core::{PreloadReport, RequestManager};
