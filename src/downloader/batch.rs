//! An ordered group of tasks that succeeds or fails as a unit

use tracing::debug;

use super::task::{RunContext, Task, TaskAddress, TaskStep};
use crate::error::TransferError;
use crate::transfer::TransferEvent;
use crate::types::{BatchId, BatchSnapshot, Status};

/// What a batch transition produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BatchStep {
    /// Nothing to report
    Idle,
    /// A task is transferring
    Running,
    /// Aggregated progress moved forward
    Progress(u8),
    /// Every task is complete
    Complete,
    /// A task failed and the run halted
    Failed(TransferError),
}

/// Aggregate progress of `total` tasks, `complete` of them done and the
/// current one at `current` percent
pub(crate) fn aggregate_progress(current: u8, complete: usize, total: usize) -> u8 {
    if total == 0 || complete >= total {
        return 100;
    }
    ((current.min(100) as usize + complete * 100) / total) as u8
}

/// A group of tasks downloaded one after another
#[derive(Debug)]
pub struct Batch {
    id: BatchId,
    tasks: Vec<Task>,
    status: Status,
    current: Option<usize>,
    progress: u8,
}

impl Batch {
    /// Create a batch running `tasks` in order
    pub fn new(id: impl Into<BatchId>, tasks: Vec<Task>) -> Self {
        Self {
            id: id.into(),
            tasks,
            status: Status::Paused,
            current: None,
            progress: 0,
        }
    }

    /// Batch holding a single task, identified by the task id
    pub fn single(task: Task) -> Self {
        Self::new(task.id().to_string(), vec![task])
    }

    /// Batch identifier
    pub fn id(&self) -> &BatchId {
        &self.id
    }

    /// Tasks in download order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Last aggregated progress
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Whether every task finds its output on disk
    pub async fn files_exist(&self) -> bool {
        for task in &self.tasks {
            if !task.is_exist().await {
                return false;
            }
        }
        true
    }

    /// Point-in-time view
    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            current_task: self.current,
            tasks: self.tasks.iter().map(Task::snapshot).collect(),
        }
    }

    /// Whether some earlier run already touched this batch
    pub(crate) fn has_run(&self) -> bool {
        self.current.is_some() || self.tasks.iter().any(|t| t.status() != Status::Paused)
    }

    fn complete_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status() == Status::Complete)
            .count()
    }

    fn current_progress(&self) -> u8 {
        self.current
            .and_then(|index| self.tasks.get(index))
            .filter(|task| task.status() != Status::Complete)
            .map(Task::progress)
            .unwrap_or(0)
    }

    /// Recompute progress, returning it when it moved forward
    fn advance_progress(&mut self) -> Option<u8> {
        let progress =
            aggregate_progress(self.current_progress(), self.complete_count(), self.tasks.len());
        if progress > self.progress {
            self.progress = progress;
            Some(progress)
        } else {
            None
        }
    }

    /// Start (or restart) the run from the first unfinished task
    pub(crate) fn download(&mut self, ctx: &RunContext) -> BatchStep {
        if self.status == Status::InProgress
            && let Some(task) = self.current.and_then(|index| self.tasks.get_mut(index))
        {
            task.interrupt();
        }
        self.status = Status::InProgress;
        self.do_next(ctx)
    }

    fn do_next(&mut self, ctx: &RunContext) -> BatchStep {
        let Some(index) = self.tasks.iter().position(|t| t.status() == Status::Paused) else {
            self.status = Status::Complete;
            self.current = None;
            self.progress = 100;
            debug!(batch_id = %self.id, "batch complete");
            return BatchStep::Complete;
        };

        self.current = Some(index);
        let address = TaskAddress {
            batch: self.id.clone(),
            index,
        };
        self.tasks[index].download(ctx, address);
        BatchStep::Running
    }

    /// Apply a transfer event of the task at `index`
    pub(crate) fn handle(
        &mut self,
        index: usize,
        run: u64,
        event: TransferEvent,
        ctx: &RunContext,
    ) -> BatchStep {
        if self.status.is_terminal() || self.current != Some(index) {
            debug!(batch_id = %self.id, index, "ignoring event for inactive task");
            return BatchStep::Idle;
        }
        let Some(task) = self.tasks.get_mut(index) else {
            return BatchStep::Idle;
        };

        match task.handle(run, event, ctx) {
            TaskStep::Ignored => BatchStep::Idle,
            TaskStep::Progress(_) => self
                .advance_progress()
                .map_or(BatchStep::Idle, BatchStep::Progress),
            TaskStep::Complete(_) => {
                if self.status == Status::Paused {
                    // Picked up again by resume
                    self.current = None;
                    return self
                        .advance_progress()
                        .map_or(BatchStep::Idle, BatchStep::Progress);
                }
                match self.do_next(ctx) {
                    BatchStep::Complete => BatchStep::Complete,
                    _ => self
                        .advance_progress()
                        .map_or(BatchStep::Running, BatchStep::Progress),
                }
            }
            TaskStep::Failed(err) => {
                self.status = Status::Error;
                self.current = None;
                BatchStep::Failed(err)
            }
        }
    }

    /// Suspend the active task; only effective while in progress
    pub(crate) fn pause(&mut self) -> bool {
        if self.status != Status::InProgress {
            return false;
        }
        if let Some(task) = self.current.and_then(|index| self.tasks.get_mut(index)) {
            task.pause();
        }
        self.status = Status::Paused;
        true
    }

    /// Continue a paused batch from where it stopped
    pub(crate) fn resume(&mut self, ctx: &RunContext) -> BatchStep {
        if self.status != Status::Paused {
            return BatchStep::Idle;
        }
        self.status = Status::InProgress;

        if let Some(task) = self.current.and_then(|index| self.tasks.get_mut(index))
            && task.resume()
        {
            return BatchStep::Running;
        }
        self.do_next(ctx)
    }

    /// Cancel the active task and end the batch for good
    pub(crate) fn stop(&mut self) {
        if let Some(task) = self.current.take().and_then(|index| self.tasks.get_mut(index)) {
            task.stop();
        }
        if !self.status.is_terminal() {
            self.status = Status::Cancelled;
        }
    }

    #[cfg(test)]
    pub(crate) fn task_mut(&mut self, index: usize) -> Option<&mut Task> {
        self.tasks.get_mut(index)
    }
}
