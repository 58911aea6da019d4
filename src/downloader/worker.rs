//! Queue worker: the single owner of every batch
//!
//! Orchestrator handles talk to the worker through [`Command`]s; running
//! transfers talk to it through [`WorkerMessage`]s. All queue mutations
//! happen here, one message at a time.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::Listeners;
use super::batch::{Batch, BatchStep};
use super::task::{RunContext, WorkerMessage};
use crate::error::{ErrorKind, TransferError};
use crate::state_store::{Marker, StateStore};
use crate::types::{BatchId, BatchSnapshot, Event, Status};

/// Requests from orchestrator handles
pub(crate) enum Command {
    SetListeners(Listeners),
    Enqueue {
        batch: Batch,
        reply: oneshot::Sender<()>,
    },
    Skipped {
        id: BatchId,
    },
    Cancel {
        id: BatchId,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        id: Option<BatchId>,
        reply: oneshot::Sender<Vec<BatchSnapshot>>,
    },
    Destroy {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct Worker {
    queue: Vec<Batch>,
    listeners: Listeners,
    store: Arc<dyn StateStore>,
    event_tx: broadcast::Sender<Event>,
    ctx: RunContext,
    commands: mpsc::Receiver<Command>,
    transfers: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl Worker {
    pub(crate) fn new(
        store: Arc<dyn StateStore>,
        event_tx: broadcast::Sender<Event>,
        ctx: RunContext,
        commands: mpsc::Receiver<Command>,
        transfers: mpsc::UnboundedReceiver<WorkerMessage>,
    ) -> Self {
        Self {
            queue: Vec::new(),
            listeners: Listeners::default(),
            store,
            event_tx,
            ctx,
            commands,
            transfers,
        }
    }

    /// Process messages until destroyed or every handle is dropped
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Destroy { reply }) => {
                        self.destroy();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("all orchestrator handles dropped");
                        self.destroy();
                        break;
                    }
                },
                Some(message) = self.transfers.recv() => self.handle_transfer(message).await,
            }
        }
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    fn position(&self, id: &BatchId) -> Option<usize> {
        self.queue.iter().position(|batch| batch.id() == id)
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetListeners(listeners) => self.listeners = listeners,
            Command::Enqueue { batch, reply } => {
                self.enqueue(batch).await;
                let _ = reply.send(());
            }
            Command::Skipped { id } => {
                info!(batch_id = %id, "batch already downloaded, skipping");
                self.listeners.success(&id);
                self.emit(Event::Complete { id, skipped: true });
            }
            Command::Cancel { id, reply } => {
                let cancelled = self.cancel(&id);
                if cancelled {
                    self.promote_and_settle().await;
                }
                let _ = reply.send(cancelled);
            }
            Command::Snapshot { id, reply } => {
                let snapshots = self
                    .queue
                    .iter()
                    .filter(|batch| id.as_ref().is_none_or(|id| batch.id() == id))
                    .map(Batch::snapshot)
                    .collect();
                let _ = reply.send(snapshots);
            }
            // Handled by the run loop
            Command::Destroy { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn handle_transfer(&mut self, message: WorkerMessage) {
        let WorkerMessage {
            address,
            run,
            event,
        } = message;

        let Some(position) = self.position(&address.batch) else {
            debug!(batch_id = %address.batch, run, "dropping event for a batch no longer queued");
            return;
        };

        let step = self.queue[position].handle(address.index, run, event, &self.ctx);
        self.settle(address.batch, step).await;
    }

    /// Make `batch` the single running batch
    async fn enqueue(&mut self, batch: Batch) {
        let id = batch.id().clone();

        if let Err(e) = self.store.remove(&id).await {
            warn!(batch_id = %id, error = %e, "failed to clear completion marker");
        }

        for queued in self.queue.iter_mut().filter(|b| b.id() != &id) {
            if queued.pause() {
                info!(batch_id = %queued.id(), "batch preempted");
                self.event_tx
                    .send(Event::Paused {
                        id: queued.id().clone(),
                    })
                    .ok();
            }
        }

        let step = match self.position(&id) {
            Some(position) => {
                let step = self.queue[position].resume(&self.ctx);
                if step != BatchStep::Idle {
                    info!(batch_id = %id, "resuming queued batch");
                    self.emit(Event::Resumed { id: id.clone() });
                }
                step
            }
            None => {
                info!(batch_id = %id, tasks = batch.tasks().len(), "batch queued");
                self.emit(Event::Queued { id: id.clone() });
                self.queue.push(batch);
                let last = self.queue.len() - 1;
                let step = self.queue[last].download(&self.ctx);
                self.emit(Event::Started { id: id.clone() });
                step
            }
        };

        self.settle(id, step).await;
    }

    /// Follow a batch step through completion and promotion until the
    /// queue is quiet again
    async fn settle(&mut self, id: BatchId, step: BatchStep) {
        let (mut id, mut step) = (id, step);
        loop {
            match step {
                BatchStep::Idle | BatchStep::Running => return,
                BatchStep::Progress(percent) => {
                    self.listeners.progress(&id, percent);
                    self.emit(Event::Progress { id, percent });
                    return;
                }
                BatchStep::Complete => self.finish_success(&id).await,
                BatchStep::Failed(err) => self.finish_failure(&id, err).await,
            }

            match self.promote_next() {
                Some((next_id, next_step)) => {
                    id = next_id;
                    step = next_step;
                }
                None => return,
            }
        }
    }

    async fn promote_and_settle(&mut self) {
        if let Some((id, step)) = self.promote_next() {
            self.settle(id, step).await;
        }
    }

    /// Start the oldest waiting batch unless one is already running
    fn promote_next(&mut self) -> Option<(BatchId, BatchStep)> {
        if self
            .queue
            .iter()
            .any(|batch| batch.status() == Status::InProgress)
        {
            return None;
        }

        let batch = self
            .queue
            .iter_mut()
            .find(|batch| !batch.status().is_terminal())?;
        let id = batch.id().clone();
        let resumed = batch.has_run();
        let step = batch.resume(&self.ctx);

        if resumed {
            info!(batch_id = %id, "resuming oldest waiting batch");
            self.emit(Event::Resumed { id: id.clone() });
        } else {
            info!(batch_id = %id, "starting oldest waiting batch");
            self.emit(Event::Started { id: id.clone() });
        }
        Some((id, step))
    }

    fn remove(&mut self, id: &BatchId) -> Option<Batch> {
        let position = self.position(id)?;
        Some(self.queue.remove(position))
    }

    async fn finish_success(&mut self, id: &BatchId) {
        if let Err(e) = self.store.set(id, Marker::Uploaded).await {
            warn!(batch_id = %id, error = %e, "failed to write completion marker");
        }
        self.remove(id);

        info!(batch_id = %id, "batch complete");
        self.listeners.progress(id, 100);
        self.emit(Event::Progress {
            id: id.clone(),
            percent: 100,
        });
        self.listeners.success(id);
        self.emit(Event::Complete {
            id: id.clone(),
            skipped: false,
        });
    }

    async fn finish_failure(&mut self, id: &BatchId, err: TransferError) {
        if let Err(e) = self.store.remove(id).await {
            warn!(batch_id = %id, error = %e, "failed to clear completion marker");
        }
        if let Some(mut batch) = self.remove(id) {
            batch.stop();
        }

        info!(batch_id = %id, kind = %err.kind, message = %err.message, "batch failed");
        self.listeners.error(id, &err);
        self.emit(Event::Failed {
            id: id.clone(),
            kind: err.kind,
            message: err.message,
        });
    }

    fn cancel(&mut self, id: &BatchId) -> bool {
        let Some(mut batch) = self.remove(id) else {
            return false;
        };
        batch.stop();
        info!(batch_id = %id, "batch cancelled");
        self.emit(Event::Cancelled { id: id.clone() });
        true
    }

    fn destroy(&mut self) {
        for mut batch in self.queue.drain(..) {
            batch.stop();
            self.event_tx
                .send(Event::Cancelled {
                    id: batch.id().clone(),
                })
                .ok();
        }
        info!("orchestrator destroyed");
        self.emit(Event::Destroyed);
    }
}

impl Listeners {
    fn success(&self, id: &BatchId) {
        if let Some(callback) = &self.on_success {
            callback(id);
        }
    }

    fn progress(&self, id: &BatchId, percent: u8) {
        if let Some(callback) = &self.on_progress {
            callback(id, percent);
        }
    }

    fn error(&self, id: &BatchId, err: &TransferError) {
        let callback = match err.kind {
            ErrorKind::Load => &self.on_load_error,
            ErrorKind::Archive => &self.on_extract_error,
            ErrorKind::Unknown => &self.on_unknown_error,
        };
        if let Some(callback) = callback {
            callback(id, &err.message);
        }
    }
}
