//! A mini executor for batches of independent tasks.
//!
//! Tasks are registered on an [`Executor`], started together on the tokio
//! runtime (optionally capped by [`ExecutorConfig::max_concurrency`]) and each
//! produces exactly one [`TaskResult`]. Failures and panics stay inside their
//! own result. A run can be bounded by a deadline, after which the executor
//! stops waiting and reports which tasks did not finish.
//!
//! ```no_run
//! # async fn demo() -> Result<(), miniexec::ExecutorError> {
//! use std::time::Duration;
//! use miniexec::{BoxError, Executor};
//!
//! let executor = Executor::default();
//! executor.register("fetch", || async {
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!     Ok::<_, BoxError>(1)
//! })?;
//! executor.register("parse", || async { Ok::<_, BoxError>(2) })?;
//!
//! let wall = executor.run_all().await?;
//! let summary = executor.summary()?;
//! println!("{wall:?} {:?}", summary.speedup());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod report;
pub mod task;

pub use config::ExecutorConfig;
pub use error::{BoxError, ConfigError, ExecutorError, TaskFailure};
pub use executor::{
    Executor, ExecutorEvent, ExecutorState, ResultRecorder, RunOutcome, Summary,
    TaskStatus,
};
pub use report::{Describable, render_table};
pub use task::{TaskContext, TaskId, TaskResult, TaskRunner};
