use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use console::style;

use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// A lint failure that was reported but did not stop the run.
    Tolerated,
}

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
    pub outcome: Outcome,
}

/// Timing and outcome of every task a run executed, in completion order of
/// the stages.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub executions: Vec<(TaskId, TaskExecution)>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, id: TaskId, execution: TaskExecution) {
        self.executions.push((id, execution));
    }

    /// Tasks whose failures were tolerated.
    pub fn tolerated(&self) -> Vec<TaskId> {
        self.executions
            .iter()
            .filter(|(_, exec)| exec.outcome == Outcome::Tolerated)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Wall time from the first task start to the last task end.
    pub fn elapsed(&self) -> Duration {
        let start = self.executions.iter().map(|(_, e)| e.start).min();
        let end = self.executions.iter().map(|(_, e)| e.start + e.duration).max();

        match (start, end) {
            (Some(start), Some(end)) => end.duration_since(start),
            _ => Duration::ZERO,
        }
    }

    pub fn summary(&self) -> impl Display + '_ {
        Summary(self)
    }
}

struct Summary<'a>(&'a Diagnostics);

impl Display for Summary<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let tolerated = self.0.tolerated().len();
        write!(
            f,
            "{} tasks in {}ms",
            self.0.executions.len(),
            self.0.elapsed().as_millis()
        )?;

        if tolerated > 0 {
            write!(f, ", {}", style(format!("{tolerated} with problems")).yellow())?;
        }

        Ok(())
    }
}

impl Display for Diagnostics {
    /// Renders one line per task with its offset from the start of the run.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let Some(origin) = self.executions.iter().map(|(_, e)| e.start).min() else {
            return writeln!(f, "no tasks were run");
        };

        for (id, exec) in &self.executions {
            let offset = exec.start.duration_since(origin);
            let marker = match exec.outcome {
                Outcome::Ok => style("ok").green(),
                Outcome::Tolerated => style("problems").yellow(),
            };

            writeln!(
                f,
                "{:<18} {:>7.2?} {:>9.2?}  {marker}",
                id.name(),
                offset,
                exec.duration
            )?;
        }

        writeln!(f, "{}", self.summary())
    }
}
