use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::RwLock;

use crate::{
    executor::summary::TaskTiming,
    task::{TaskId, TaskResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// A result for the same task is already stored; the new one was dropped.
    Duplicate,
    /// The accepting window is over; the result was dropped.
    Closed,
}

struct Inner<T> {
    results: Vec<TaskResult<T>>,
    seen: HashSet<TaskId>,
    accepting: bool,
}

/// Append-only sink for task results, shared by every running task.
///
/// Only the executor writes. Writes take the lock exclusively and check the
/// accepting window under that same lock, so nothing lands after the window
/// closes. Snapshots take it shared and copy.
pub struct ResultRecorder<T> {
    inner: RwLock<Inner<T>>,
    discarded: AtomicUsize,
}

impl<T> ResultRecorder<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                results: Vec::new(),
                seen: HashSet::new(),
                accepting: true,
            }),
            discarded: AtomicUsize::new(0),
        }
    }

    pub(crate) fn record(&self, result: TaskResult<T>) -> RecordOutcome {
        let mut inner = self.inner.write();
        if !inner.accepting {
            drop(inner);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return RecordOutcome::Closed;
        }
        if !inner.seen.insert(result.task_id) {
            return RecordOutcome::Duplicate;
        }
        inner.results.push(result);
        RecordOutcome::Recorded
    }

    /// Ends the accepting window. Returns false if it was already closed.
    pub(crate) fn close(&self) -> bool {
        std::mem::replace(&mut self.inner.write().accepting, false)
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.read().accepting
    }

    pub fn len(&self) -> usize {
        self.inner.read().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.inner.read().seen.contains(&task_id)
    }

    /// Number of results turned away because they arrived after close.
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }

    pub(crate) fn timings(&self) -> Vec<TaskTiming> {
        self.inner
            .read()
            .results
            .iter()
            .map(TaskTiming::from)
            .collect()
    }
}

impl<T: Clone> ResultRecorder<T> {
    /// Consistent copy of everything recorded so far, in completion order.
    pub fn all_results(&self) -> Vec<TaskResult<T>> {
        self.inner.read().results.clone()
    }
}
