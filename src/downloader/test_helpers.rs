//! Shared test helpers: a scripted executor and orchestrator harness.

use async_trait::async_trait;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::task::{RunContext, WorkerMessage};
use super::{Batch, Destination, Orchestrator, Task, TimingListener};
use crate::config::Config;
use crate::error::TransferError;
use crate::state_store::MemoryStateStore;
use crate::transfer::{
    ProgressSink, TransferAbort, TransferControl, TransferExecutor, TransferRequest,
};
use crate::types::{Event, TransferStats};

/// How long tests wait for something that should happen
pub(crate) const WAIT: Duration = Duration::from_secs(5);

/// How long tests wait to be confident something does not happen
pub(crate) const QUIET: Duration = Duration::from_millis(150);

enum Script {
    Finish(std::result::Result<TransferStats, TransferAbort>),
    Panic,
}

/// A transfer parked inside [`ScriptedExecutor`], finished by the test
pub(crate) struct ScriptedTransfer {
    pub(crate) request: TransferRequest,
    pub(crate) control: TransferControl,
    progress: ProgressSink,
    finish: oneshot::Sender<Script>,
}

impl ScriptedTransfer {
    pub(crate) fn url(&self) -> &str {
        &self.request.source
    }

    pub(crate) fn report(&self, percent: u8) {
        self.progress.report(percent);
    }

    pub(crate) fn succeed(self) {
        let stats = TransferStats {
            url: self.request.source.clone(),
            elapsed: Duration::from_millis(5),
            bytes: 1024,
        };
        let _ = self.finish.send(Script::Finish(Ok(stats)));
    }

    pub(crate) fn fail(self, err: TransferError) {
        let _ = self
            .finish
            .send(Script::Finish(Err(TransferAbort::Failed(err))));
    }

    pub(crate) fn panic(self) {
        let _ = self.finish.send(Script::Panic);
    }
}

/// Executor handing every transfer to the test instead of the network
pub(crate) struct ScriptedExecutor {
    transfers: mpsc::UnboundedSender<ScriptedTransfer>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ScriptedTransfer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { transfers: tx }), rx)
    }
}

#[async_trait]
impl TransferExecutor for ScriptedExecutor {
    async fn transfer(
        &self,
        request: TransferRequest,
        control: TransferControl,
        progress: ProgressSink,
    ) -> std::result::Result<TransferStats, TransferAbort> {
        let (finish, script) = oneshot::channel();
        let parked = ScriptedTransfer {
            request,
            control: control.clone(),
            progress,
            finish,
        };
        if self.transfers.send(parked).is_err() {
            return Err(TransferAbort::Cancelled);
        }

        tokio::select! {
            _ = control.cancelled() => Err(TransferAbort::Cancelled),
            script = script => match script {
                Ok(Script::Finish(result)) => result,
                Ok(Script::Panic) => panic!("scripted executor failure"),
                Err(_) => Err(TransferAbort::Cancelled),
            },
        }
    }
}

/// Timing listener recording every call
#[derive(Default)]
pub(crate) struct RecordingTiming {
    pub(crate) calls: Mutex<Vec<(String, Duration, u64)>>,
}

impl TimingListener for RecordingTiming {
    fn on_loading(&self, url: &str, elapsed: Duration, bytes: u64) {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), elapsed, bytes));
    }
}

/// Context for driving tasks and batches without a worker
pub(crate) struct TestContext {
    pub(crate) ctx: RunContext,
    pub(crate) messages: mpsc::UnboundedReceiver<WorkerMessage>,
    pub(crate) transfers: mpsc::UnboundedReceiver<ScriptedTransfer>,
    pub(crate) timing: Arc<RecordingTiming>,
    pub(crate) temp: TempDir,
}

impl TestContext {
    pub(crate) async fn next_transfer(&mut self) -> ScriptedTransfer {
        tokio::time::timeout(WAIT, self.transfers.recv())
            .await
            .expect("timed out waiting for a transfer")
            .expect("executor dropped")
    }

    pub(crate) async fn next_message(&mut self) -> WorkerMessage {
        tokio::time::timeout(WAIT, self.messages.recv())
            .await
            .expect("timed out waiting for a worker message")
            .expect("transfer channel closed")
    }

    pub(crate) async fn assert_no_message(&mut self) {
        if let Ok(Some(message)) = tokio::time::timeout(QUIET, self.messages.recv()).await {
            panic!("unexpected worker message: {message:?}");
        }
    }
}

pub(crate) fn create_test_context() -> TestContext {
    let temp = tempdir().unwrap();
    let (executor, transfers) = ScriptedExecutor::new();
    let (tx, messages) = mpsc::unbounded_channel();
    let timing = Arc::new(RecordingTiming::default());

    let ctx = RunContext {
        executor,
        temp_dir: temp.path().join("temp"),
        timing: Some(timing.clone()),
        transfers: tx,
        next_run: Arc::new(AtomicU64::new(1)),
    };

    TestContext {
        ctx,
        messages,
        transfers,
        timing,
        temp,
    }
}

/// Build a batch of `count` tasks saving under `root/out/<id>`
pub(crate) fn sample_batch(root: &std::path::Path, id: &str, count: usize) -> Batch {
    let tasks = (0..count)
        .map(|i| {
            Task::new(
                format!("{id}-{i}"),
                format!("http://assets.test/{id}/{i}.bin"),
                Destination::new(root.join("out").join(id)),
            )
        })
        .collect();
    Batch::new(id, tasks)
}

/// Orchestrator wired to a scripted executor and an in-memory store
pub(crate) struct Harness {
    pub(crate) orchestrator: Orchestrator,
    pub(crate) transfers: mpsc::UnboundedReceiver<ScriptedTransfer>,
    pub(crate) events: broadcast::Receiver<Event>,
    pub(crate) store: Arc<MemoryStateStore>,
    pub(crate) timing: Arc<RecordingTiming>,
    pub(crate) temp: TempDir,
}

/// Helper to create a test Orchestrator. The TempDir must be kept alive.
pub(crate) async fn create_test_orchestrator() -> Harness {
    let temp = tempdir().unwrap();

    let config = Config {
        temp_dir: temp.path().join("temp"),
        ..Config::default()
    };

    let (executor, transfers) = ScriptedExecutor::new();
    let store = Arc::new(MemoryStateStore::new());
    let timing = Arc::new(RecordingTiming::default());

    let orchestrator = Orchestrator::builder(config)
        .with_executor(executor)
        .with_state_store(store.clone())
        .with_timing_listener(timing.clone())
        .build()
        .await
        .unwrap();
    let events = orchestrator.subscribe();

    Harness {
        orchestrator,
        transfers,
        events,
        store,
        timing,
        temp,
    }
}

impl Harness {
    pub(crate) fn batch(&self, id: &str, count: usize) -> Batch {
        sample_batch(self.temp.path(), id, count)
    }

    pub(crate) async fn next_transfer(&mut self) -> ScriptedTransfer {
        tokio::time::timeout(WAIT, self.transfers.recv())
            .await
            .expect("timed out waiting for a transfer")
            .expect("executor dropped")
    }

    pub(crate) async fn assert_no_transfer(&mut self) {
        if let Ok(Some(transfer)) = tokio::time::timeout(QUIET, self.transfers.recv()).await {
            panic!("unexpected transfer of {}", transfer.url());
        }
    }

    /// Skip events until one matches `predicate`
    pub(crate) async fn wait_for(&mut self, predicate: impl Fn(&Event) -> bool) -> Event {
        tokio::time::timeout(WAIT, async {
            loop {
                let event = self.events.recv().await.expect("event channel closed");
                if predicate(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Every event emitted so far that has not been consumed
    pub(crate) fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
