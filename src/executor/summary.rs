use std::time::Duration;

use crate::{
    error::ExecutorError,
    task::{TaskId, TaskResult},
};

/// How one run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub wall_time: Duration,
    pub deadline: Option<Duration>,
    /// The run stopped waiting before every task finished: the deadline
    /// elapsed, or the run future was dropped.
    pub timed_out: bool,
    /// Tasks with no recorded result, sorted by id. Empty unless timed out.
    pub unfinished: Vec<TaskId>,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        !self.timed_out
    }

    /// Turns a timed-out run into [`ExecutorError::TimedOut`]; otherwise yields
    /// the wall time.
    pub fn into_result(self) -> Result<Duration, ExecutorError> {
        if self.timed_out {
            return Err(ExecutorError::TimedOut {
                deadline: self.deadline.unwrap_or(self.wall_time),
                unfinished: self.unfinished,
            });
        }
        Ok(self.wall_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTiming {
    pub task_id: TaskId,
    pub name: String,
    pub duration: Duration,
    pub success: bool,
}

impl<T> From<&TaskResult<T>> for TaskTiming {
    fn from(result: &TaskResult<T>) -> Self {
        Self {
            task_id: result.task_id,
            name: result.task_name.clone(),
            duration: result.duration,
            success: result.is_success(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// One entry per recorded result, sorted by task id.
    pub timings: Vec<TaskTiming>,
    pub wall_time: Duration,
    /// What the run would have taken executing one task after another.
    pub serial_time: Duration,
    pub succeeded: usize,
    pub failed: usize,
    pub unfinished: Vec<TaskId>,
    pub timed_out: bool,
}

impl Summary {
    pub(crate) fn new(mut timings: Vec<TaskTiming>, outcome: &RunOutcome) -> Self {
        timings.sort_by_key(|t| t.task_id);
        let serial_time = timings.iter().map(|t| t.duration).sum();
        let succeeded = timings.iter().filter(|t| t.success).count();
        let failed = timings.len() - succeeded;

        Self {
            timings,
            wall_time: outcome.wall_time,
            serial_time,
            succeeded,
            failed,
            unfinished: outcome.unfinished.clone(),
            timed_out: outcome.timed_out,
        }
    }

    pub fn total(&self) -> usize {
        self.timings.len() + self.unfinished.len()
    }

    /// `serial_time / wall_time`; `None` for a zero wall time.
    pub fn speedup(&self) -> Option<f64> {
        if self.wall_time.is_zero() {
            return None;
        }
        Some(self.serial_time.as_secs_f64() / self.wall_time.as_secs_f64())
    }

    pub fn saved_time(&self) -> Duration {
        self.serial_time.saturating_sub(self.wall_time)
    }

    pub fn duration_of(&self, task_id: TaskId) -> Option<Duration> {
        self.timings
            .iter()
            .find(|t| t.task_id == task_id)
            .map(|t| t.duration)
    }
}
