//! A single file transfer and its lifecycle
//!
//! A [`Task`] never runs on its own: the orchestrator worker starts it, feeds
//! it the [`TransferEvent`]s of its run and reads back a [`TaskStep`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use super::TimingListener;
use crate::error::TransferError;
use crate::transfer::{
    ProgressSink, TransferAbort, TransferControl, TransferEvent, TransferExecutor, TransferRequest,
};
use crate::types::{BatchId, Status, TaskSnapshot, TransferStats};
use crate::utils::{has_entry_with_stem, path_component};

/// Where and under which name a task places its output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    saving_dir: PathBuf,
    file_name: Option<String>,
    temp_file_name: Option<String>,
    new_folder: bool,
    clear_folder: bool,
    prefix: String,
    postfix: String,
}

impl Destination {
    /// Place output in `saving_dir`, archives unpacked into a sub-folder
    pub fn new(saving_dir: impl Into<PathBuf>) -> Self {
        Self {
            saving_dir: saving_dir.into(),
            file_name: None,
            temp_file_name: None,
            new_folder: true,
            clear_folder: false,
            prefix: String::new(),
            postfix: String::new(),
        }
    }

    /// Fixed base name of the output (without extension)
    ///
    /// Defaults to the task id.
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Base name used while the payload is streamed
    pub fn temp_file_name(mut self, name: impl Into<String>) -> Self {
        self.temp_file_name = Some(name.into());
        self
    }

    /// Unpack archives into `saving_dir/<name>` (true) or straight into `saving_dir`
    pub fn new_folder(mut self, enabled: bool) -> Self {
        self.new_folder = enabled;
        self
    }

    /// Empty `saving_dir` before placing the output
    pub fn clear_folder(mut self, enabled: bool) -> Self {
        self.clear_folder = enabled;
        self
    }

    /// Prepended to the output name
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Appended to the output name, before the extension
    pub fn postfix(mut self, postfix: impl Into<String>) -> Self {
        self.postfix = postfix.into();
        self
    }

    /// Folder the output is placed in
    pub fn saving_dir(&self) -> &Path {
        &self.saving_dir
    }
}

/// Identifies a task inside the queue
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TaskAddress {
    pub(crate) batch: BatchId,
    pub(crate) index: usize,
}

/// A transfer event tagged with the run that produced it
#[derive(Debug)]
pub(crate) struct WorkerMessage {
    pub(crate) address: TaskAddress,
    pub(crate) run: u64,
    pub(crate) event: TransferEvent,
}

/// Collaborators a task needs to start a run
#[derive(Clone)]
pub(crate) struct RunContext {
    pub(crate) executor: Arc<dyn TransferExecutor>,
    pub(crate) temp_dir: PathBuf,
    pub(crate) timing: Option<Arc<dyn TimingListener>>,
    pub(crate) transfers: mpsc::UnboundedSender<WorkerMessage>,
    pub(crate) next_run: Arc<AtomicU64>,
}

/// What a handled transfer event did to the task
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TaskStep {
    /// Stale or out-of-state event
    Ignored,
    /// Progress moved forward
    Progress(u8),
    /// The task finished
    Complete(TransferStats),
    /// The task failed
    Failed(TransferError),
}

#[derive(Debug)]
struct ActiveRun {
    id: u64,
    control: TransferControl,
}

/// One file to fetch
#[derive(Debug)]
pub struct Task {
    id: String,
    url: String,
    destination: Destination,
    status: Status,
    progress: u8,
    last_error: Option<TransferError>,
    run: Option<ActiveRun>,
}

impl Task {
    /// Create a task fetching `url` into `destination`
    pub fn new(id: impl Into<String>, url: impl Into<String>, destination: Destination) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            destination,
            status: Status::Paused,
            progress: 0,
            last_error: None,
            run: None,
        }
    }

    /// Task identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Source URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Output placement
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Progress of the current run (0-100)
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Name of the output without extension: prefix + (file name | id) + postfix
    pub fn output_stem(&self) -> String {
        let base = self.destination.file_name.as_deref().unwrap_or(&self.id);
        format!("{}{}{}", self.destination.prefix, base, self.destination.postfix)
    }

    /// Whether the output is present in the saving folder, whatever its extension
    pub async fn is_exist(&self) -> bool {
        has_entry_with_stem(&self.destination.saving_dir, &self.output_stem()).await
    }

    /// Point-in-time view
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            url: self.url.clone(),
            status: self.status,
            progress: self.progress,
            last_error: self.last_error.clone(),
        }
    }

    fn request(&self, temp_dir: &Path) -> TransferRequest {
        let file_name = self
            .destination
            .file_name
            .clone()
            .unwrap_or_else(|| self.id.clone());

        TransferRequest {
            source: self.url.clone(),
            temp_dir: temp_dir.to_path_buf(),
            dest_dir: self.destination.saving_dir.clone(),
            file_name: Some(file_name),
            temp_file_name: self.destination.temp_file_name.clone(),
            name_prefix: self.destination.prefix.clone(),
            name_postfix: self.destination.postfix.clone(),
            clear_folder: self.destination.clear_folder,
            new_folder: self.destination.new_folder,
        }
    }

    /// Start a fresh run, abandoning any previous one
    pub(crate) fn download(&mut self, ctx: &RunContext, address: TaskAddress) {
        if self.status == Status::InProgress {
            self.stop();
        }
        if let Some(previous) = self.run.take() {
            previous.control.cancel();
        }

        let run = ctx.next_run.fetch_add(1, Ordering::Relaxed);
        let control = TransferControl::new();

        let progress_tx = ctx.transfers.clone();
        let progress_address = address.clone();
        let progress = ProgressSink::new(control.clone(), move |percent| {
            let _ = progress_tx.send(WorkerMessage {
                address: progress_address.clone(),
                run,
                event: TransferEvent::Progress(percent),
            });
        });

        debug!(task_id = %self.id, batch_id = %address.batch, run, "starting task");

        // One temp folder per batch
        let temp_dir = ctx.temp_dir.join(path_component(address.batch.as_str()));

        tokio::spawn(run_transfer(
            ctx.executor.clone(),
            self.request(&temp_dir),
            control.clone(),
            progress,
            ctx.transfers.clone(),
            address,
            run,
        ));

        self.status = Status::InProgress;
        self.progress = 0;
        self.last_error = None;
        self.run = Some(ActiveRun { id: run, control });
    }

    /// Apply an event of run `run`
    pub(crate) fn handle(&mut self, run: u64, event: TransferEvent, ctx: &RunContext) -> TaskStep {
        if self.run.as_ref().map(|active| active.id) != Some(run) || self.status.is_terminal() {
            debug!(task_id = %self.id, run, "ignoring stale transfer event");
            return TaskStep::Ignored;
        }

        match event {
            TransferEvent::Progress(percent) => {
                if self.status != Status::InProgress || percent <= self.progress {
                    return TaskStep::Ignored;
                }
                self.progress = percent.min(100);
                TaskStep::Progress(self.progress)
            }
            TransferEvent::Done(stats) => {
                self.status = Status::Complete;
                self.progress = 100;
                self.run = None;
                debug!(task_id = %self.id, bytes = stats.bytes, "task complete");
                if let Some(timing) = &ctx.timing {
                    timing.on_loading(&stats.url, stats.elapsed, stats.bytes);
                }
                TaskStep::Complete(stats)
            }
            TransferEvent::Failed(err) => {
                self.status = Status::Error;
                self.run = None;
                self.last_error = Some(err.clone());
                debug!(task_id = %self.id, kind = %err.kind, message = %err.message, "task failed");
                TaskStep::Failed(err)
            }
        }
    }

    /// Suspend the run; only effective while in progress
    pub(crate) fn pause(&mut self) -> bool {
        if self.status != Status::InProgress {
            return false;
        }
        if let Some(run) = &self.run {
            run.control.pause();
        }
        self.status = Status::Paused;
        true
    }

    /// Continue a suspended run; only effective while paused with a live run
    pub(crate) fn resume(&mut self) -> bool {
        if self.status != Status::Paused {
            return false;
        }
        let Some(run) = &self.run else {
            return false;
        };
        run.control.resume();
        self.status = Status::InProgress;
        true
    }

    /// Abort the run for good
    pub(crate) fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.control.cancel();
        }
        if self.status != Status::Complete {
            self.status = Status::Cancelled;
        }
    }

    /// Abort the run and make the task eligible to start again
    pub(crate) fn interrupt(&mut self) {
        if let Some(run) = self.run.take() {
            run.control.cancel();
        }
        if self.status != Status::Complete {
            self.status = Status::Paused;
            self.progress = 0;
        }
    }

    #[cfg(test)]
    pub(crate) fn current_run(&self) -> Option<u64> {
        self.run.as_ref().map(|run| run.id)
    }
}

/// Drive one executor call and report its outcome to the worker
///
/// The executor runs in its own tokio task so a panic is reported as
/// `Unknown` instead of taking the worker down. Once the run is cancelled
/// that task is aborted and nothing is reported.
async fn run_transfer(
    executor: Arc<dyn TransferExecutor>,
    request: TransferRequest,
    control: TransferControl,
    progress: ProgressSink,
    transfers: mpsc::UnboundedSender<WorkerMessage>,
    address: TaskAddress,
    run: u64,
) {
    let watcher = control.clone();
    let mut handle =
        tokio::spawn(async move { executor.transfer(request, control, progress).await });

    let outcome = tokio::select! {
        _ = watcher.cancelled() => {
            handle.abort();
            return;
        }
        outcome = &mut handle => outcome,
    };

    let event = match outcome {
        Ok(Ok(stats)) => TransferEvent::Done(stats),
        Ok(Err(TransferAbort::Failed(err))) => TransferEvent::Failed(err),
        Ok(Err(TransferAbort::Cancelled)) => return,
        Err(join_error) => TransferEvent::Failed(TransferError::unknown(format!(
            "transfer aborted: {}",
            join_error
        ))),
    };

    // A result produced while paused is held back until the run resumes
    if watcher.checkpoint().await.is_err() {
        return;
    }

    let _ = transfers.send(WorkerMessage {
        address,
        run,
        event,
    });
}
