use std::time::Duration;

use thiserror::Error;

use crate::task::TaskId;

/// Error type returned by task work.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structural misuse of an executor. Task failures never show up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("cannot register task `{task_name}`: executor has already started")]
    RegistrationClosed { task_name: String },

    #[error("executor has already been started")]
    AlreadyStarted,

    #[error("executor has not completed a run yet")]
    NotCompleted,

    #[error("run timed out after {deadline:?} with {} unfinished task(s)", .unfinished.len())]
    TimedOut {
        deadline: Duration,
        unfinished: Vec<TaskId>,
    },
}

/// Why a single task did not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    #[error("{message}")]
    Error { message: String },

    #[error("task panicked: {message}")]
    Panicked { message: String },
}

impl TaskFailure {
    pub fn message(&self) -> &str {
        match self {
            TaskFailure::Error { message } | TaskFailure::Panicked { message } => message,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskFailure::Panicked { .. })
    }
}

impl From<BoxError> for TaskFailure {
    fn from(err: BoxError) -> Self {
        TaskFailure::Error {
            message: err.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}
