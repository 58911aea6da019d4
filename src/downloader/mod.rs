//! Download orchestration
//!
//! - [`Orchestrator`] - cloneable handle accepting download requests
//! - [`batch`] - an ordered group of tasks that succeeds or fails as a unit
//! - [`task`] - a single file transfer and its lifecycle
//! - [`worker`] - the loop that exclusively owns the queue
//!
//! At most one task transfers at any time. A new request preempts whatever
//! is running; when a batch finishes (either way) the oldest batch still
//! waiting in the queue is resumed.

mod batch;
mod task;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use batch::Batch;
pub use task::{Destination, Task};

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::extraction::ZipExtractor;
use crate::state_store::{Marker, StateStore};
use crate::transfer::{HttpTransferExecutor, TransferExecutor};
use crate::types::{BatchId, BatchSnapshot, Event};
use task::RunContext;
use worker::{Command, Worker};

/// Capacity of the command channel between handles and the worker
const COMMAND_BUFFER: usize = 64;

/// Receives the timing of every successful task
pub trait TimingListener: Send + Sync {
    /// `url` took `elapsed` (paused time excluded) to deliver `bytes`
    fn on_loading(&self, url: &str, elapsed: Duration, bytes: u64);
}

type IdCallback = Arc<dyn Fn(&BatchId) + Send + Sync>;
type MessageCallback = Arc<dyn Fn(&BatchId, &str) + Send + Sync>;
type ProgressCallback = Arc<dyn Fn(&BatchId, u8) + Send + Sync>;

/// Callbacks invoked by the orchestrator
///
/// Callbacks run on the worker and must not block.
#[derive(Clone, Default)]
pub struct Listeners {
    on_success: Option<IdCallback>,
    on_load_error: Option<MessageCallback>,
    on_extract_error: Option<MessageCallback>,
    on_unknown_error: Option<MessageCallback>,
    on_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("on_success", &self.on_success.is_some())
            .field("on_load_error", &self.on_load_error.is_some())
            .field("on_extract_error", &self.on_extract_error.is_some())
            .field("on_unknown_error", &self.on_unknown_error.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl Listeners {
    /// Empty listener set
    pub fn new() -> Self {
        Self::default()
    }

    /// A batch finished, or was already on disk
    pub fn on_success(mut self, f: impl Fn(&BatchId) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// A batch failed with a LOAD error
    pub fn on_load_error(mut self, f: impl Fn(&BatchId, &str) + Send + Sync + 'static) -> Self {
        self.on_load_error = Some(Arc::new(f));
        self
    }

    /// A batch failed with an ARCHIVE error
    pub fn on_extract_error(mut self, f: impl Fn(&BatchId, &str) + Send + Sync + 'static) -> Self {
        self.on_extract_error = Some(Arc::new(f));
        self
    }

    /// A batch failed with an UNKNOWN error
    pub fn on_unknown_error(mut self, f: impl Fn(&BatchId, &str) + Send + Sync + 'static) -> Self {
        self.on_unknown_error = Some(Arc::new(f));
        self
    }

    /// Aggregated batch progress moved forward
    pub fn on_progress(mut self, f: impl Fn(&BatchId, u8) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }
}

/// Builder for [`Orchestrator`] with replaceable collaborators
pub struct OrchestratorBuilder {
    config: Config,
    store: Option<Arc<dyn StateStore>>,
    executor: Option<Arc<dyn TransferExecutor>>,
    timing: Option<Arc<dyn TimingListener>>,
}

impl OrchestratorBuilder {
    /// Use `store` instead of the SQLite database from the configuration
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `executor` instead of the HTTP executor
    pub fn with_executor(mut self, executor: Arc<dyn TransferExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Report per-task timing to `timing`
    pub fn with_timing_listener(mut self, timing: Arc<dyn TimingListener>) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Validate the configuration, open collaborators and start the worker
    pub async fn build(self) -> Result<Orchestrator> {
        let config = self.config;
        config.validate()?;

        tokio::fs::create_dir_all(&config.temp_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.temp_dir.display(),
                        e
                    ),
                ))
            })?;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(Database::new(&config.persistence.database_path).await?),
        };

        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(HttpTransferExecutor::new(
                &config.http,
                Arc::new(ZipExtractor::new()),
            )?),
        };

        let (event_tx, _rx) = broadcast::channel(config.event_capacity);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (transfer_tx, transfer_rx) = mpsc::unbounded_channel();

        let ctx = RunContext {
            executor,
            temp_dir: config.temp_dir.clone(),
            timing: self.timing,
            transfers: transfer_tx,
            next_run: Arc::new(AtomicU64::new(1)),
        };

        let worker = Worker::new(store.clone(), event_tx.clone(), ctx, command_rx, transfer_rx);
        tokio::spawn(worker.run());

        tracing::info!(temp_dir = ?config.temp_dir, "orchestrator started");

        Ok(Orchestrator {
            commands: command_tx,
            event_tx,
            store,
            config: Arc::new(config),
        })
    }
}

/// Handle to the download queue (cloneable; all clones share one queue)
#[derive(Clone)]
pub struct Orchestrator {
    commands: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<Event>,
    store: Arc<dyn StateStore>,
    config: Arc<Config>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator backed by SQLite and HTTP, as configured
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use batch_dl::{Batch, Config, Destination, Listeners, Orchestrator, Task};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let orchestrator = Orchestrator::new(Config::default()).await?;
    ///     orchestrator
    ///         .set_listeners(Listeners::new().on_success(|id| println!("{id} ready")))
    ///         .await?;
    ///
    ///     let batch = Batch::new(
    ///         "level-7",
    ///         vec![
    ///             Task::new("map", "https://cdn.example.com/l7/map.zip", Destination::new("levels/7")),
    ///             Task::new("music", "https://cdn.example.com/l7/music.ogg", Destination::new("levels/7")),
    ///         ],
    ///     );
    ///     orchestrator.request_download(batch).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        Self::builder(config).build().await
    }

    /// Start building an orchestrator with custom collaborators
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            store: None,
            executor: None,
            timing: None,
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::ShuttingDown)
    }

    /// Replace the callback set; in-flight work is unaffected
    pub async fn set_listeners(&self, listeners: Listeners) -> Result<()> {
        self.send(Command::SetListeners(listeners)).await
    }

    /// Subscribe to orchestrator events
    ///
    /// Every subscriber receives all events. A subscriber falling behind by
    /// more than `event_capacity` events gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Download `batch` unless it is already on disk
    ///
    /// An already downloaded batch is reported as a success right away and
    /// the queue is left untouched.
    pub async fn request_download(&self, batch: Batch) -> Result<()> {
        if self.is_downloaded(&batch).await? {
            return self.send(Command::Skipped { id: batch.id().clone() }).await;
        }
        self.force_download(batch).await
    }

    /// Make `batch` the one running batch, whatever is on disk
    ///
    /// Every other queued batch is paused. A batch with the same id that is
    /// already queued is resumed in place and `batch` is dropped.
    pub async fn force_download(&self, batch: Batch) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.send(Command::Enqueue { batch, reply }).await?;
        done.await.map_err(|_| Error::ShuttingDown)
    }

    /// Whether the batch has a completion marker and all of its files
    pub async fn is_downloaded(&self, batch: &Batch) -> Result<bool> {
        Ok(self.is_loaded_success(batch.id()).await? && batch.files_exist().await)
    }

    /// Whether the batch has a completion marker
    pub async fn is_loaded_success(&self, id: &BatchId) -> Result<bool> {
        Ok(self.store.get(id).await? == Some(Marker::Uploaded))
    }

    /// Stop a queued batch for good and drop it from the queue
    ///
    /// Returns false if no batch with that id is queued.
    pub async fn cancel(&self, id: &BatchId) -> Result<bool> {
        let (reply, done) = oneshot::channel();
        self.send(Command::Cancel {
            id: id.clone(),
            reply,
        })
        .await?;
        done.await.map_err(|_| Error::ShuttingDown)
    }

    /// Snapshot of a queued batch
    pub async fn status(&self, id: &BatchId) -> Result<Option<BatchSnapshot>> {
        Ok(self.snapshot(Some(id.clone())).await?.into_iter().next())
    }

    /// Snapshots of every queued batch, in queue order
    pub async fn queue(&self) -> Result<Vec<BatchSnapshot>> {
        self.snapshot(None).await
    }

    async fn snapshot(&self, id: Option<BatchId>) -> Result<Vec<BatchSnapshot>> {
        let (reply, done) = oneshot::channel();
        self.send(Command::Snapshot { id, reply }).await?;
        done.await.map_err(|_| Error::ShuttingDown)
    }

    /// Cancel every queued batch and stop the worker
    ///
    /// Calling this more than once is harmless. Every other operation fails
    /// with [`Error::ShuttingDown`] afterwards.
    pub async fn destroy(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Destroy { reply }).await.is_err() {
            tracing::debug!("orchestrator already destroyed");
            return;
        }
        let _ = done.await;
    }
}
