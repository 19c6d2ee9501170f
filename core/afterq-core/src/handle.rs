//! Cancellable handles for scheduled calls.
//!
//! A [`CallHandle`] is returned by every `schedule` call and supports
//! best-effort, idempotent cancellation from any thread.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::scheduler::Shared;

/// Boxed callback type accepted by the scheduler.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Sentinel heap index meaning "not in the pending set".
pub(crate) const UNQUEUED: usize = usize::MAX;

/// One scheduled call, shared between its handle and the pending heap.
///
/// `pos` and `callback` are only read or written while the owning
/// scheduler's mutex is held; the atomic and the inner mutex exist to
/// satisfy `Sync`, not to provide independent synchronization.
pub(crate) struct Entry {
    /// Absolute time at which the callback becomes eligible to run.
    pub(crate) fire_at: Instant,

    /// Current index in the pending heap, or [`UNQUEUED`].
    pub(crate) pos: AtomicUsize,

    /// The callback; taken exactly once, on fire or on cancel.
    pub(crate) callback: Mutex<Option<Callback>>,
}

impl Entry {
    pub(crate) fn new(fire_at: Instant, callback: Option<Callback>) -> Self {
        Self {
            fire_at,
            pos: AtomicUsize::new(UNQUEUED),
            callback: Mutex::new(callback),
        }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos.load(Ordering::Relaxed)
    }

    pub(crate) fn set_pos(&self, pos: usize) {
        self.pos.store(pos, Ordering::Relaxed);
    }

    /// True while the entry sits in the pending set.
    pub(crate) fn is_charged(&self) -> bool {
        self.pos() != UNQUEUED
    }
}

enum HandleKind {
    /// Stateless handle whose cancel is always a no-op.
    Void,
    /// Handle backed by a real entry (charged or detached).
    Scheduled {
        entry: Arc<Entry>,
        shared: Arc<Shared>,
    },
}

/// Cancellable reference to one scheduled deferred call.
///
/// Obtained from [`Scheduler::schedule`](crate::Scheduler::schedule). Cancel
/// is best-effort: if the callback has not fired yet it will never fire; if
/// it already fired or was already cancelled, cancelling again does nothing.
///
/// [`CallHandle::void`] (also the `Default` value) builds a handle that is a
/// permanent no-op, so callers can initialize handle fields without an
/// `Option`.
pub struct CallHandle {
    kind: HandleKind,
}

impl CallHandle {
    /// Pre-built no-op handle for initializing handle variables without an
    /// `Option` or a null check.
    pub const VOID: CallHandle = CallHandle::void();

    /// A stateless handle whose [`cancel`](Self::cancel) does nothing.
    pub const fn void() -> Self {
        Self {
            kind: HandleKind::Void,
        }
    }

    pub(crate) fn scheduled(entry: Arc<Entry>, shared: Arc<Shared>) -> Self {
        Self {
            kind: HandleKind::Scheduled { entry, shared },
        }
    }

    /// Cancel the scheduled call if it has not fired yet.
    ///
    /// Idempotent and safe to call from any number of threads. Cancelling a
    /// fired, already-cancelled, detached, or void handle is a no-op.
    pub fn cancel(&self) {
        if let HandleKind::Scheduled { entry, shared } = &self.kind {
            shared.cancel(entry);
        }
    }

    /// True while the call is still pending (neither fired nor cancelled).
    ///
    /// Snapshot only: the call may fire concurrently right after this
    /// returns `true`.
    pub fn is_pending(&self) -> bool {
        match &self.kind {
            HandleKind::Void => false,
            HandleKind::Scheduled { entry, .. } => entry.is_charged(),
        }
    }
}

impl Default for CallHandle {
    fn default() -> Self {
        Self::void()
    }
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            HandleKind::Void => f.write_str("CallHandle::void"),
            HandleKind::Scheduled { entry, .. } => f
                .debug_struct("CallHandle")
                .field("fire_at", &entry.fire_at)
                .field("charged", &entry.is_charged())
                .finish(),
        }
    }
}
