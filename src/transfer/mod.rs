//! Transfer execution: moving the bytes of one task from its source to disk.
//!
//! - [`TransferExecutor`] is the seam the task layer drives; [`HttpTransferExecutor`]
//!   is the production implementation.
//! - [`TransferControl`] carries the cooperative pause signal and the hard
//!   cancellation token of one run.
//! - [`ProgressSink`] receives percentage updates and drops them while the
//!   run is paused or cancelled.

mod http;

pub use http::HttpTransferExecutor;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::types::TransferStats;

/// Everything an executor needs to place one remote file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    /// Source URL
    pub source: String,
    /// Folder the payload is streamed into
    pub temp_dir: PathBuf,
    /// Folder the finished file (or unpacked archive) ends up in
    pub dest_dir: PathBuf,
    /// Fixed base name of the output; the served name is used when absent
    pub file_name: Option<String>,
    /// Base name used while streaming; defaults to `file_name`
    pub temp_file_name: Option<String>,
    /// Prepended to every produced name
    pub name_prefix: String,
    /// Appended to every produced base name, before the extension
    pub name_postfix: String,
    /// Empty the destination before placing the output
    pub clear_folder: bool,
    /// Unpack archives into a sub-folder named after the output
    pub new_folder: bool,
}

/// Outcome of a transfer that did not succeed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferAbort {
    /// The run was cancelled; nothing must be reported
    Cancelled,
    /// The run failed
    Failed(TransferError),
}

impl From<TransferError> for TransferAbort {
    fn from(err: TransferError) -> Self {
        TransferAbort::Failed(err)
    }
}

/// Messages a transfer run produces, in order: any number of `Progress`,
/// then at most one of `Done` or `Failed`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferEvent {
    /// Percentage of the payload received (0-100)
    Progress(u8),
    /// The output is in place
    Done(TransferStats),
    /// The run failed
    Failed(TransferError),
}

/// Returned by [`TransferControl::checkpoint`] once the run is cancelled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

/// Pause/cancel signalling shared between a task and its running transfer
#[derive(Clone, Debug)]
pub struct TransferControl {
    paused: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
}

impl Default for TransferControl {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferControl {
    /// Create a control in the running, not-cancelled state
    pub fn new() -> Self {
        let (paused, _rx) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
            cancel: CancellationToken::new(),
        }
    }

    /// Ask the transfer to suspend at its next checkpoint
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    /// Wake a suspended transfer
    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Abort the transfer; irreversible
    pub fn cancel(&self) {
        self.cancel.cancel();
        // Wakes a checkpoint parked on the pause signal
        self.paused.send_replace(false);
    }

    /// Whether a pause is requested
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Whether the run was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Suspension point, called at the top of every transfer chunk
    ///
    /// Returns immediately while running; parks without polling while paused.
    /// Yields how long the run was suspended, or [`Cancelled`].
    pub async fn checkpoint(&self) -> std::result::Result<Duration, Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        if !self.is_paused() {
            return Ok(Duration::ZERO);
        }

        let started = Instant::now();
        let mut rx = self.paused.subscribe();
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Cancelled),
            resumed = rx.wait_for(|paused| !*paused) => {
                if resumed.is_err() || self.is_cancelled() {
                    Err(Cancelled)
                } else {
                    Ok(started.elapsed())
                }
            }
        }
    }
}

type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Receiver of percentage updates for one run
///
/// Values are clamped to 100 and only strictly increasing values are
/// forwarded. Nothing is forwarded while the run is paused or cancelled.
#[derive(Clone)]
pub struct ProgressSink {
    control: TransferControl,
    last: Arc<AtomicU8>,
    callback: ProgressCallback,
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("last", &self.last.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ProgressSink {
    /// Forward updates of the run governed by `control` to `callback`
    pub fn new(control: TransferControl, callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            control,
            last: Arc::new(AtomicU8::new(0)),
            callback: Arc::new(callback),
        }
    }

    /// Report the current percentage
    pub fn report(&self, percent: u8) {
        if self.control.is_paused() || self.control.is_cancelled() {
            return;
        }
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent, Ordering::AcqRel);
        if percent > previous {
            (self.callback)(percent);
        }
    }
}

/// Performs one transfer
///
/// Implementations stream `request.source` into `request.temp_dir`, call
/// [`TransferControl::checkpoint`] between chunks and stop promptly once
/// cancelled. Archive payloads are unpacked before `Ok` is returned.
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Run the transfer to completion, failure or cancellation
    async fn transfer(
        &self,
        request: TransferRequest,
        control: TransferControl,
        progress: ProgressSink,
    ) -> std::result::Result<TransferStats, TransferAbort>;
}
