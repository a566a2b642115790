//! Per-worker work queue.
//!
//! Each worker owns exactly one queue. The scheduler appends to it during
//! distribution while the worker is idle, and the worker drains it in one
//! go. The mutex only serialises that hand-off; no two writers ever race.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam::utils::CachePadded;
use engine_component::Atom;

/// The work handed to a worker for one iteration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Elapsed time for the iteration the systems belong to.
    pub delta: Duration,
    /// Systems to run, in order.
    pub systems: Vec<Atom>,
}

/// A lock-guarded queue of system identifiers for one worker.
#[derive(Debug, Default)]
pub struct WorkQueue {
    pending: CachePadded<Mutex<Batch>>,
}

impl WorkQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the queue for writing.
    ///
    /// Callbacks never run while the lock is held, so a poisoned lock still
    /// holds consistent data and is recovered.
    pub fn lock(&self) -> MutexGuard<'_, Batch> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drain the whole queue. Returns `None` if nothing is pending.
    #[must_use]
    pub fn take(&self) -> Option<Batch> {
        let mut pending = self.lock();
        if pending.systems.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut *pending))
    }

    /// Returns `true` if no systems are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().systems.is_empty()
    }

    /// Returns the number of pending systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().systems.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_empty_queue() {
        let queue = WorkQueue::new();
        assert!(queue.is_empty());
        assert!(queue.take().is_none());
    }

    #[test]
    fn test_take_drains_everything() {
        let queue = WorkQueue::new();
        {
            let mut pending = queue.lock();
            pending.delta = Duration::from_millis(16);
            pending.systems.extend([Atom::from_raw(1), Atom::from_raw(3)]);
        }
        assert_eq!(queue.len(), 2);

        let batch = queue.take().unwrap();
        assert_eq!(batch.delta, Duration::from_millis(16));
        assert_eq!(batch.systems, vec![Atom::from_raw(1), Atom::from_raw(3)]);
        assert!(queue.is_empty());
        assert!(queue.take().is_none());
    }
}
