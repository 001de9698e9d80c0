pub mod result;
pub mod runner;
pub mod task;

pub type TaskId = u64;

pub use result::TaskResult;
pub use runner::{BlockingRunner, ContextFnRunner, FnRunner, TaskRunner};

pub use task::{Task, TaskBuilder, TaskContext};
