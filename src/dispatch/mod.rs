//! 调度模块：高优先级请求立即执行，普通/低优先级请求进入队列按固定间隔批量执行。
//!
//! # Dispatch Module
//!
//! Every cache miss ends up here. A request moves through
//! `Submitted → (Immediate | Queued) → Executing → {Succeeded | Retrying → Executing | Failed}`:
//!
//! - **Immediate** (`Priority::High`): executes in the caller's own task.
//! - **Queued** (`Priority::Normal` / `Priority::Low`): appended to a FIFO and
//!   drained every `tick_interval`, at most `max_batch_size` entries per tick,
//!   all entries of a batch running concurrently. A tick that fires while the
//!   previous batch is still running is skipped.
//!
//! Both paths run the same execution: optimize, call upstream, retry with
//! exponential backoff, then record usage and store the response in the cache
//! under the key of the *original* request.

mod dispatcher;
mod retry;

pub use dispatcher::{DispatchJob, Dispatcher, PendingResult, QueueEntry};
pub use retry::{RetryConfig, RetryPolicy};
