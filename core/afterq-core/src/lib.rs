//! # afterq — Deferred-Call Scheduler
//!
//! Run a callback after a delay and get back a cancellable handle, without
//! each request owning a dedicated OS timer. All pending calls share one
//! min-heap and one timed wait; an elastic pool of worker threads fans out
//! to drain bursts of simultaneously due calls and collapses back to a
//! single waiting worker (and eventually to none) when the backlog clears.
//!
//! ## Quick start
//!
//! ```rust
//! use std::time::Duration;
//!
//! // The process-wide default scheduler.
//! let handle = afterq_core::schedule(|| println!("fired"), Duration::from_millis(10));
//!
//! // Cancel is best-effort and idempotent: before the fire time it
//! // guarantees the callback never runs, afterwards it is a no-op.
//! handle.cancel();
//! handle.cancel();
//! ```
//!
//! ## Isolated instances
//!
//! ```rust
//! use afterq_core::{Scheduler, SchedulerConfig};
//! use std::time::Duration;
//!
//! # fn main() -> afterq_core::AfterqResult<()> {
//! let scheduler = Scheduler::with_config(
//!     SchedulerConfig::default()
//!         .with_max_workers(4)
//!         .with_idle_timeout(Duration::from_millis(100)),
//! )?;
//! scheduler.schedule(|| (), Duration::ZERO);
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - A callback never runs before its fire time; firing is best-effort
//!   after it (subject to scheduling jitter).
//! - Cancellation is linearizable with firing: it either observably
//!   precedes the fire (the callback never runs) or follows it (no-op).
//!   Double-fire and fire-after-cancel are impossible.
//! - `schedule` and `cancel` never block and never fail.
//! - Nothing survives a process restart; pending calls are process-local.

pub mod error;
pub mod handle;
mod heap;
pub mod logging;
pub mod scheduler;

// Re-export commonly used types
pub use error::{AfterqError, AfterqResult};
pub use handle::{CallHandle, Callback};
pub use scheduler::{Scheduler, SchedulerConfig, default_scheduler, schedule};
