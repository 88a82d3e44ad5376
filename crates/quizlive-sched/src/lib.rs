//! Scheduling primitives for QuizLive.
//!
//! Two shared resources live here, both sized independently of the number
//! of rooms:
//!
//! - [`Scheduler`]: one-shot timers with cancellable [`TimerHandle`]s. Used
//!   for question expiry, the grace delay between questions, and the short
//!   delay before an early close.
//! - [`WorkerPool`]: a bounded set of workers that process answer
//!   submissions off the caller's task.
//!
//! # Integration
//!
//! A room session keeps the handle of its pending expiry so that whichever
//! close path runs first can cancel it:
//!
//! ```ignore
//! let expiry = scheduler.schedule(budget, close_slot(pin, slot_id));
//! // ... later, on an early close:
//! expiry.cancel();
//! ```

mod error;
mod pool;
mod timer;

pub use error::SchedError;
pub use pool::{PoolConfig, PoolStats, WorkerPool};
pub use timer::{Scheduler, SchedulerConfig, SchedulerMetrics, TimerHandle, TimerId};
