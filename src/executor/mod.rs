pub mod event;
mod executor;
pub mod recorder;
pub mod summary;

pub use event::ExecutorEvent;
pub use executor::{Executor, ExecutorState, TaskStatus};
pub use recorder::ResultRecorder;
pub use summary::{RunOutcome, Summary, TaskTiming};
