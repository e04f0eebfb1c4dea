//! 请求批处理模块：先进先出队列与并发批量执行。
//!
//! # Request Batching Module
//!
//! Building blocks for the queued dispatch path: a FIFO queue drained from the
//! head in bounded batches, and an executor that runs one batch concurrently.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchQueue`] | Unbounded FIFO, drained in batches of at most `max_batch_size` |
//! | [`BatchConfig`] | Batch size and fixed drain interval |
//! | [`BatchItem`] | Queued value with arrival time and request id |
//! | [`BatchExecutor`] | Runs a batch concurrently, isolating failures |
//! | [`BatchReport`] | Per-item outcomes of one batch |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_gateway::batch::{BatchConfig, BatchItem, BatchQueue};
//!
//! let config = BatchConfig::new().with_max_batch_size(2);
//! let queue: BatchQueue<&str> = BatchQueue::new();
//! queue.push(BatchItem::new("a"));
//! queue.push(BatchItem::new("b"));
//! queue.push(BatchItem::new("c"));
//!
//! let batch = queue.take_batch(config.max_batch_size);
//! assert_eq!(batch.len(), 2);
//! assert_eq!(queue.len(), 1);
//! ```

mod collector;
mod executor;

pub use collector::{BatchConfig, BatchItem, BatchQueue};
pub use executor::{BatchExecutor, BatchReport, ItemFailure};
pub(crate) use executor::panic_message;
