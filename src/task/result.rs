use std::time::{Duration, SystemTime};

use crate::{error::TaskFailure, task::TaskId};

/// Outcome and timing of one finished task. Built once by the executor and
/// never touched again.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult<T> {
    pub task_id: TaskId,
    pub task_name: String,
    pub outcome: Result<T, TaskFailure>,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    /// Measured on the monotonic clock; `finished_at - started_at` equals it.
    pub duration: Duration,
}

impl<T> TaskResult<T> {
    pub(crate) fn new(
        task_id: TaskId,
        task_name: String,
        outcome: Result<T, TaskFailure>,
        started_at: SystemTime,
        duration: Duration,
    ) -> Self {
        Self {
            task_id,
            task_name,
            outcome,
            started_at,
            finished_at: started_at + duration,
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&TaskFailure> {
        self.outcome.as_ref().err()
    }
}
