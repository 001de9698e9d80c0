use std::fmt::Display;

use crate::{
    error::TaskFailure,
    executor::{RunOutcome, Summary},
    task::TaskResult,
};

/// Something that can say what it is in one line.
pub trait Describable {
    fn describe(&self) -> String;
}

impl Describable for TaskFailure {
    fn describe(&self) -> String {
        match self {
            TaskFailure::Error { message } => format!("error: {message}"),
            TaskFailure::Panicked { message } => format!("panic: {message}"),
        }
    }
}

impl<T: Display> Describable for TaskResult<T> {
    fn describe(&self) -> String {
        match &self.outcome {
            Ok(value) => format!(
                "task {} ({}) -> {value} in {:?}",
                self.task_id, self.task_name, self.duration
            ),
            Err(failure) => format!(
                "task {} ({}) failed after {:?}: {}",
                self.task_id,
                self.task_name,
                self.duration,
                failure.describe()
            ),
        }
    }
}

impl Describable for RunOutcome {
    fn describe(&self) -> String {
        if self.timed_out {
            format!(
                "timed out after {:?}, unfinished tasks: {:?}",
                self.wall_time, self.unfinished
            )
        } else {
            format!("completed in {:?}", self.wall_time)
        }
    }
}

impl Describable for Summary {
    fn describe(&self) -> String {
        let speedup = self
            .speedup()
            .map(|s| format!("{s:.2}x"))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "{} task(s): {} succeeded, {} failed, {} unfinished; wall {:?}, serial {:?}, speed-up {speedup}",
            self.total(),
            self.succeeded,
            self.failed,
            self.unfinished.len(),
            self.wall_time,
            self.serial_time,
        )
    }
}

const RULE: &str = "------------------------------------------------------------";

fn row(id: impl Display, name: &str, duration: &str, outcome: &str) -> String {
    format!("{id:<5} {name:<15} {duration:<15} {outcome:<20}")
}

/// Fixed-width table of results ordered by task id, followed by the run totals.
pub fn render_table<T: Display>(results: &[TaskResult<T>], summary: &Summary) -> String {
    let mut rows: Vec<&TaskResult<T>> = results.iter().collect();
    rows.sort_by_key(|r| r.task_id);

    let mut lines = vec![row("ID", "Task", "Duration", "Result"), RULE.to_string()];
    lines.extend(rows.into_iter().map(|result| {
        let outcome = match &result.outcome {
            Ok(value) => value.to_string(),
            Err(failure) => failure.describe(),
        };
        row(
            result.task_id,
            &result.task_name,
            &format!("{:?}", result.duration),
            &outcome,
        )
    }));
    lines.extend(
        summary
            .unfinished
            .iter()
            .map(|task_id| row(task_id, "", "-", "unfinished")),
    );
    lines.push(RULE.to_string());
    lines.push(format!("Serial time: {:?}", summary.serial_time));
    lines.push(format!("Wall time:   {:?}", summary.wall_time));
    lines.push(format!("Saved:       {:?}", summary.saved_time()));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
