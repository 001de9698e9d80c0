use std::{future::Future, sync::Arc};

use crate::{error::BoxError, task::TaskContext};

#[async_trait::async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn run(&self, ctx: TaskContext) -> Result<Self::Output, BoxError>;
}

/// Runs a zero-argument async closure.
pub struct FnRunner<F>(pub F);

#[async_trait::async_trait]
impl<F, Fut, T, E> TaskRunner for FnRunner<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<BoxError> + 'static,
{
    type Output = T;

    async fn run(&self, _ctx: TaskContext) -> Result<T, BoxError> {
        (self.0)().await.map_err(Into::into)
    }
}

/// Runs an async closure that wants to look at its [`TaskContext`],
/// usually to watch for cancellation.
pub struct ContextFnRunner<F>(pub F);

#[async_trait::async_trait]
impl<F, Fut, T, E> TaskRunner for ContextFnRunner<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<BoxError> + 'static,
{
    type Output = T;

    async fn run(&self, ctx: TaskContext) -> Result<T, BoxError> {
        (self.0)(ctx).await.map_err(Into::into)
    }
}

/// Runs a synchronous closure on tokio's blocking pool, so CPU-bound work
/// gets a thread of its own.
pub struct BlockingRunner<F>(Arc<F>);

impl<F> BlockingRunner<F> {
    pub fn new(f: F) -> Self {
        Self(Arc::new(f))
    }
}

#[async_trait::async_trait]
impl<F, T, E> TaskRunner for BlockingRunner<F>
where
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    type Output = T;

    async fn run(&self, _ctx: TaskContext) -> Result<T, BoxError> {
        let f = Arc::clone(&self.0);
        match tokio::task::spawn_blocking(move || f()).await {
            Ok(result) => result.map_err(Into::into),
            // Re-raise so the executor records it like any other panic.
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(err.into()),
        }
    }
}
