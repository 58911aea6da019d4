//! Core types for batch-dl

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ErrorKind, TransferError};

/// Unique identifier for a batch
///
/// Identifiers are compared verbatim; two batches with the same id are the
/// same batch as far as the queue and the completion markers are concerned.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl BatchId {
    /// Create a new BatchId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BatchId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BatchId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for BatchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status shared by tasks and batches
///
/// `Paused → InProgress → {Complete, Error, Cancelled}`. A fresh task or
/// batch starts out `Paused`, meaning "not running".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not running; either never started or suspended
    #[default]
    Paused,
    /// Currently transferring
    InProgress,
    /// Finished successfully
    Complete,
    /// Failed; the run is over but the queue continues
    Error,
    /// Stopped for good; must be recreated to run again
    Cancelled,
}

impl Status {
    /// Whether no further transition is possible for this run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Complete | Status::Error | Status::Cancelled)
    }
}

/// Statistics reported by a successful transfer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    /// The URL that was actually requested
    pub url: String,
    /// Time spent transferring, excluding paused intervals
    pub elapsed: Duration,
    /// Size of the payload in bytes
    pub bytes: u64,
}

/// Point-in-time view of a task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task identifier
    pub id: String,
    /// Source URL
    pub url: String,
    /// Current status
    pub status: Status,
    /// Last reported progress (0-100)
    pub progress: u8,
    /// Error of the last failed run, if any
    pub last_error: Option<TransferError>,
}

/// Point-in-time view of a batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    /// Batch identifier
    pub id: BatchId,
    /// Current status
    pub status: Status,
    /// Last aggregated progress (0-100)
    pub progress: u8,
    /// Index of the task currently owning the transfer
    pub current_task: Option<usize>,
    /// Tasks in download order
    pub tasks: Vec<TaskSnapshot>,
}

/// Event emitted by the orchestrator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new batch was appended to the queue
    Queued {
        /// Batch ID
        id: BatchId,
    },

    /// A batch began (or restarted) its run
    Started {
        /// Batch ID
        id: BatchId,
    },

    /// A batch was preempted by a newer request
    Paused {
        /// Batch ID
        id: BatchId,
    },

    /// A paused batch continued its run
    Resumed {
        /// Batch ID
        id: BatchId,
    },

    /// Aggregated batch progress
    Progress {
        /// Batch ID
        id: BatchId,
        /// Percentage (0-100)
        percent: u8,
    },

    /// A batch finished successfully
    Complete {
        /// Batch ID
        id: BatchId,
        /// True when the batch was already on disk and nothing was transferred
        skipped: bool,
    },

    /// A batch run failed
    Failed {
        /// Batch ID
        id: BatchId,
        /// Failure class
        kind: ErrorKind,
        /// Error message
        message: String,
    },

    /// A batch was stopped and dropped from the queue
    Cancelled {
        /// Batch ID
        id: BatchId,
    },

    /// The orchestrator was destroyed
    Destroyed,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!Status::Paused.is_terminal());
        assert!(!Status::InProgress.is_terminal());
        assert!(Status::Complete.is_terminal());
        assert!(Status::Error.is_terminal());
        assert!(Status::Cancelled.is_terminal());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::Failed {
            id: BatchId::from("maps"),
            kind: ErrorKind::Load,
            message: "code: 500".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["id"], "maps");
        assert_eq!(json["kind"], "LOAD");
    }

    #[test]
    fn batch_id_is_transparent_in_json() {
        let id: BatchId = serde_json::from_str("\"levels-1\"").unwrap();
        assert_eq!(id, BatchId::new("levels-1"));
        assert_eq!(id.to_string(), "levels-1");
    }
}
