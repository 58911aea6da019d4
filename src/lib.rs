//! # batch-dl
//!
//! Sequential group downloader for application assets.
//!
//! ## Design Philosophy
//!
//! batch-dl is designed to be:
//! - **One transfer at a time** - output folders are never written concurrently
//! - **Newest first** - a new request preempts, finished work promotes the oldest waiting batch
//! - **Resumable** - preempted batches continue where they stopped
//! - **Event-driven** - consumers get callbacks and a broadcast event stream
//!
//! ## Quick Start
//!
//! ```no_run
//! use batch_dl::{Batch, Config, Destination, Listeners, Orchestrator, Task};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::new(Config::default()).await?;
//!
//!     orchestrator
//!         .set_listeners(
//!             Listeners::new()
//!                 .on_success(|id| println!("{id} is ready"))
//!                 .on_load_error(|id, message| eprintln!("{id}: {message}")),
//!         )
//!         .await?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let levels = Destination::new("assets/levels").prefix("lvl_");
//!     let batch = Batch::new(
//!         "chapter-1",
//!         vec![
//!             Task::new("1", "https://cdn.example.com/levels/1.zip", levels.clone()),
//!             Task::new("2", "https://cdn.example.com/levels/2.zip", levels),
//!         ],
//!     );
//!     orchestrator.request_download(batch).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Download orchestration: orchestrator, batches and tasks
pub mod downloader;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Completion marker storage
pub mod state_store;
/// Transfer execution
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, HttpConfig, PersistenceConfig};
pub use db::Database;
pub use downloader::{
    Batch, Destination, Listeners, Orchestrator, OrchestratorBuilder, Task, TimingListener,
};
pub use error::{DatabaseError, Error, ErrorKind, Result, TransferError};
pub use extraction::{ArchiveExtractor, ZipExtractor};
pub use state_store::{Marker, MemoryStateStore, StateStore};
pub use transfer::{
    HttpTransferExecutor, ProgressSink, TransferAbort, TransferControl, TransferExecutor,
    TransferRequest,
};
pub use types::{BatchId, BatchSnapshot, Event, Status, TaskSnapshot, TransferStats};

/// Helper function to run the orchestrator with graceful signal handling.
///
/// Waits for a termination signal and then calls [`Orchestrator::destroy`].
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use batch_dl::{Config, Orchestrator, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = Orchestrator::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(orchestrator).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: Orchestrator) {
    wait_for_signal().await;
    orchestrator.destroy().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
