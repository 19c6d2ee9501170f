//! Pending set: an array-backed binary min-heap keyed by fire time.
//!
//! Every stored entry carries its own current index (`Entry::pos`), updated
//! on every swap, so cancellation can remove an arbitrary entry by position
//! in O(log n). A cancelled entry leaves the set immediately; a waiting
//! worker then recomputes its deadline against the true minimum.

use std::sync::Arc;
use std::time::Instant;

use crate::handle::{Entry, UNQUEUED};

/// Min-heap of pending entries ordered by `fire_at`.
///
/// All mutation happens with the scheduler mutex held; the heap itself is
/// a plain single-threaded structure.
#[derive(Default)]
pub(crate) struct PendingHeap {
    entries: Vec<Arc<Entry>>,
}

impl PendingHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest fire time over all pending entries.
    pub(crate) fn peek_fire_at(&self) -> Option<Instant> {
        self.entries.first().map(|e| e.fire_at)
    }

    /// Insert an entry and record its heap index.
    pub(crate) fn push(&mut self, entry: Arc<Entry>) {
        let i = self.entries.len();
        entry.set_pos(i);
        self.entries.push(entry);
        self.sift_up(i);
    }

    /// Remove and return the entry with the earliest fire time.
    pub(crate) fn pop_min(&mut self) -> Option<Arc<Entry>> {
        self.remove(0)
    }

    /// Remove the entry at heap index `pos`, re-linking sibling positions.
    ///
    /// Returns `None` when `pos` is out of range (e.g. [`UNQUEUED`]).
    pub(crate) fn remove(&mut self, pos: usize) -> Option<Arc<Entry>> {
        if pos >= self.entries.len() {
            return None;
        }
        let last = self.entries.len() - 1;
        if pos != last {
            self.swap(pos, last);
        }
        let removed = self.entries.pop()?;
        removed.set_pos(UNQUEUED);
        if pos < self.entries.len() {
            // The tail element moved into `pos`; one of these is a no-op.
            self.sift_down(pos);
            self.sift_up(pos);
        }
        Some(removed)
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.entries.swap(i, j);
        self.entries[i].set_pos(i);
        self.entries[j].set_pos(j);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.entries[i].fire_at >= self.entries[parent].fire_at {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut min = left;
            if right < len && self.entries[right].fire_at < self.entries[left].fire_at {
                min = right;
            }
            if self.entries[i].fire_at <= self.entries[min].fire_at {
                break;
            }
            self.swap(i, min);
            i = min;
        }
    }
}
