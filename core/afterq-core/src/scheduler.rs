//! Deferred-call coordinator and its elastic worker pool.
//!
//! One mutex serializes all pending-set mutations and worker-count changes.
//! Workers share a single timed wait on the earliest fire time instead of
//! one OS timer per scheduled call; a condvar with a coalescing dirty flag
//! carries best-effort wakeups when the set changes under a sleeping worker.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace};

use crate::error::{AfterqError, AfterqResult};
use crate::handle::{Callback, CallHandle, Entry, UNQUEUED};
use crate::heap::PendingHeap;

/// Tuning parameters for a [`Scheduler`].
///
/// The defaults bound transient fan-out at 10 workers and let an idle
/// worker linger 30s before exiting; neither number is load-bearing and
/// both may be tuned per instance.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on concurrently active workers.
    pub max_workers: usize,
    /// How long a lone worker waits on an empty pending set before exiting.
    pub idle_timeout: Duration,
}

impl SchedulerConfig {
    pub const DEFAULT_MAX_WORKERS: usize = 10;
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Set the worker cap.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    fn validate(&self) -> AfterqResult<()> {
        if self.max_workers == 0 {
            return Err(AfterqError::ZeroWorkerCap(self.max_workers));
        }
        if self.idle_timeout.is_zero() {
            return Err(AfterqError::ZeroIdleTimeout);
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: Self::DEFAULT_MAX_WORKERS,
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// State guarded by the scheduler mutex.
struct Core {
    pending: PendingHeap,
    /// Number of live worker threads.
    workers: usize,
    /// Coalesced wake signal; set by add/cancel, consumed by one worker.
    wake_pending: bool,
}

/// Coordinator state shared by the scheduler value, its handles, and every
/// worker thread.
pub(crate) struct Shared {
    core: Mutex<Core>,
    wake: Condvar,
    max_workers: usize,
    idle_timeout: Duration,
}

impl Shared {
    /// Push a charged entry and make sure a worker will see it.
    fn add(self: &Arc<Self>, entry: Arc<Entry>) {
        let mut core = self.core.lock();
        core.pending.push(entry);
        if core.workers == 0 {
            core.workers = 1;
            let shared = Arc::clone(self);
            std::thread::spawn(move || shared.worker_loop(None));
            debug!("spawned first worker, {} pending", core.pending.len());
        } else {
            // A sleeping worker may be waiting past the new fire time.
            core.wake_pending = true;
            self.wake.notify_one();
        }
    }

    /// Remove a charged entry so it can never fire. No-op for entries that
    /// already fired, were already cancelled, or were never queued.
    pub(crate) fn cancel(&self, entry: &Arc<Entry>) {
        let mut core = self.core.lock();
        let pos = entry.pos();
        if pos == UNQUEUED {
            return;
        }
        core.pending.remove(pos);
        let callback = entry.callback.lock().take();
        if core.workers > 0 {
            // A worker may be sleeping on exactly this entry's fire time.
            core.wake_pending = true;
            self.wake.notify_one();
        }
        trace!("cancelled entry, {} pending", core.pending.len());
        drop(core);
        // The callback's captures may call back into the scheduler when
        // dropped, so it must not be dropped under the lock.
        drop(callback);
    }

    /// Elastic worker loop.
    ///
    /// `carried` is a callback handed off by the parent worker so the
    /// parent can keep draining the pending set without blocking on user
    /// code. Never holds the mutex while waiting or invoking a callback.
    fn worker_loop(self: Arc<Self>, mut carried: Option<Callback>) {
        // True once this worker has already seen the pending set empty; a
        // second consecutive empty observation ends the worker.
        let mut idle_once = false;
        loop {
            if let Some(f) = carried.take() {
                run_callback(f);
            }

            let mut core = self.core.lock();
            let timeout = if core.pending.is_empty() {
                if core.workers > 1 || idle_once {
                    core.workers -= 1;
                    debug!("worker exiting, {} remain", core.workers);
                    return;
                }
                idle_once = true;
                self.idle_timeout
            } else {
                idle_once = false;
                let Some(fire_at) = core.pending.peek_fire_at() else {
                    continue;
                };
                let now = Instant::now();
                if fire_at <= now {
                    if let Some(entry) = core.pending.pop_min() {
                        let callback = entry.callback.lock().take();
                        if core.workers < self.max_workers {
                            // Hand the due callback to a sibling and keep
                            // draining; bursts fire in parallel.
                            core.workers += 1;
                            debug!("fan-out to {} workers", core.workers);
                            let shared = Arc::clone(&self);
                            std::thread::spawn(move || shared.worker_loop(callback));
                        } else {
                            carried = callback;
                        }
                    }
                    continue;
                }
                if core.workers > 1 {
                    // Redundant after a burst: someone else owns the wait.
                    core.workers -= 1;
                    debug!("fan-in to {} workers", core.workers);
                    return;
                }
                fire_at - now
            };

            // Wait for the deadline or a wake signal, lock released while
            // blocked. A pending signal short-circuits the wait entirely.
            if !core.wake_pending {
                let _ = self.wake.wait_for(&mut core, timeout);
            }
            if core.wake_pending {
                core.wake_pending = false;
                idle_once = false;
            }
        }
    }
}

/// Invoke a fired callback, isolating panics from the worker pool.
///
/// A panicking callback must not kill its worker thread: the thread still
/// owns a slot in the worker count.
fn run_callback(f: Callback) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!("scheduled callback panicked; worker continues");
    }
}

/// Process-local deferred-call scheduler.
///
/// Callbacks are multiplexed onto a small elastic pool of worker threads:
/// the pool grows (up to a cap) while bursts of simultaneously due calls
/// are draining and collapses back to at most one waiting worker once the
/// backlog clears. With nothing pending, the last worker exits after the
/// configured idle timeout and the process carries no scheduler threads at
/// all.
///
/// Most callers use the process-wide instance through the free
/// [`schedule`] function; independent instances exist for test isolation
/// and custom tuning. Worker threads are detached: dropping a `Scheduler`
/// value does not cancel in-flight callbacks, since handles and workers
/// keep the shared state alive.
///
/// # Example
///
/// ```rust
/// use afterq_core::Scheduler;
/// use std::time::Duration;
///
/// let scheduler = Scheduler::new();
/// let handle = scheduler.schedule(|| println!("fired"), Duration::from_millis(5));
///
/// // Cancelling before the fire time guarantees the callback never runs.
/// handle.cancel();
/// ```
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Create a scheduler with the default configuration.
    pub fn new() -> Self {
        Self::from_config(SchedulerConfig::default())
    }

    /// Create a scheduler with a custom configuration.
    pub fn with_config(config: SchedulerConfig) -> AfterqResult<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    pending: PendingHeap::new(),
                    workers: 0,
                    wake_pending: false,
                }),
                wake: Condvar::new(),
                max_workers: config.max_workers,
                idle_timeout: config.idle_timeout,
            }),
        }
    }

    /// Schedule `f` to run after `delay`.
    ///
    /// Returns immediately with a cancellable handle; never blocks and
    /// never fails. A zero `delay` means "as soon as a worker can run it".
    /// The callback runs on a worker thread at or after the fire time,
    /// never earlier; no ordering is guaranteed between independently
    /// scheduled calls.
    pub fn schedule<F>(&self, f: F, delay: Duration) -> CallHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_boxed(Some(Box::new(f)), delay)
    }

    /// Like [`schedule`](Self::schedule), but takes an optional pre-boxed
    /// callback. A `None` callback yields a detached handle that never
    /// enters the pending set; its `cancel` is forever a no-op.
    pub fn schedule_boxed(&self, callback: Option<Callback>, delay: Duration) -> CallHandle {
        let charged = callback.is_some();
        let entry = Arc::new(Entry::new(Instant::now() + delay, callback));
        if charged {
            self.shared.add(Arc::clone(&entry));
        }
        CallHandle::scheduled(entry, Arc::clone(&self.shared))
    }

    /// Number of currently live worker threads.
    pub fn active_workers(&self) -> usize {
        self.shared.core.lock().workers
    }

    /// Number of not-yet-fired, not-yet-cancelled calls.
    pub fn pending(&self) -> usize {
        self.shared.core.lock().pending.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_SCHEDULER: OnceLock<Scheduler> = OnceLock::new();

/// The process-wide default scheduler, created on first use.
pub fn default_scheduler() -> &'static Scheduler {
    DEFAULT_SCHEDULER.get_or_init(Scheduler::new)
}

/// Schedule `f` on the process-wide default scheduler.
///
/// See [`Scheduler::schedule`].
pub fn schedule<F>(f: F, delay: Duration) -> CallHandle
where
    F: FnOnce() + Send + 'static,
{
    default_scheduler().schedule(f, delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_builders() {
        let config = SchedulerConfig::default()
            .with_max_workers(4)
            .with_idle_timeout(Duration::from_millis(50));
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.idle_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_config_rejects_zero_worker_cap() {
        let result = Scheduler::with_config(SchedulerConfig::default().with_max_workers(0));
        assert_eq!(result.err(), Some(AfterqError::ZeroWorkerCap(0)));
    }

    #[test]
    fn test_config_rejects_zero_idle_timeout() {
        let result =
            Scheduler::with_config(SchedulerConfig::default().with_idle_timeout(Duration::ZERO));
        assert_eq!(result.err(), Some(AfterqError::ZeroIdleTimeout));
    }

    #[test]
    fn test_detached_handle_never_queued() {
        let scheduler = Scheduler::new();
        let handle = scheduler.schedule_boxed(None, Duration::from_millis(1));
        assert!(!handle.is_pending());
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.active_workers(), 0);
        handle.cancel();
        handle.cancel();
    }

    #[test]
    fn test_zero_delay_fires() {
        let scheduler = Scheduler::new();
        let called = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&called);
        scheduler.schedule(
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
            Duration::ZERO,
        );
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_keeps_pool_alive() {
        let scheduler = Scheduler::new();
        scheduler.schedule(|| panic!("boom"), Duration::ZERO);
        std::thread::sleep(Duration::from_millis(50));

        let called = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&called);
        scheduler.schedule(
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(1),
        );
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(called.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_workers(), 1);
    }
}
