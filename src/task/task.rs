use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    error::BoxError,
    task::{BlockingRunner, TaskId, TaskRunner},
};

pub struct Task<T> {
    /// The unique identifier for the task.
    pub task_id: TaskId,
    /// Display label, not unique.
    pub name: String,
    /// The actual task runner that will be executed.
    pub(crate) runner: Arc<dyn TaskRunner<Output = T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            task_id: self.task_id,
            name: self.name.clone(),
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("task_id", &self.task_id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Default, Clone)]
pub struct TaskBuilder {
    task_id: TaskId,
    name: String,
}

impl TaskBuilder {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            ..Default::default()
        }
    }

    pub fn with_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn spawn_async<R: TaskRunner>(self, task_runner: R) -> Task<R::Output> {
        Task {
            task_id: self.task_id,
            name: self.name,
            runner: Arc::new(task_runner),
        }
    }

    pub fn spawn_blocking<F, T, E>(self, f: F) -> Task<T>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.spawn_async(BlockingRunner::new(f))
    }
}

/// Handed to every run of a task.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// The id of Task.
    pub task_id: TaskId,
    pub name: String,

    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(task_id: TaskId, name: String, cancel: CancellationToken) -> Self {
        Self {
            task_id,
            name,
            cancel,
        }
    }

    /// True once the executor has stopped waiting for this run.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the executor stops waiting. Work that wants to stop early
    /// selects on this; nothing forces it to.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
