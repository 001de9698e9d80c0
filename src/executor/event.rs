use std::time::Duration;

use async_channel::{Sender, TrySendError};
use tracing::debug;

use crate::task::TaskId;

/// Lifecycle notifications published while a run is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorEvent {
    RunStarted {
        tasks: usize,
    },
    TaskStarted {
        task_id: TaskId,
        name: String,
    },
    TaskFinished {
        task_id: TaskId,
        name: String,
        success: bool,
        duration: Duration,
    },
    /// The task finished after the run stopped waiting for it.
    TaskDiscarded {
        task_id: TaskId,
        name: String,
    },
    RunFinished {
        wall_time: Duration,
        timed_out: bool,
    },
}

#[derive(Clone, Default)]
pub(crate) struct EventSink {
    sender: Option<Sender<ExecutorEvent>>,
}

impl EventSink {
    pub(crate) fn new(sender: Option<Sender<ExecutorEvent>>) -> Self {
        Self { sender }
    }

    /// Never waits on the consumer; a full or closed channel drops the event.
    pub(crate) fn emit(&self, event: ExecutorEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!(?event, "event channel full, dropping event"),
            Err(TrySendError::Closed(event)) => debug!(?event, "event channel closed, dropping event"),
        }
    }
}
