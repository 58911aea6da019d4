//! Error types for batch-dl
//!
//! This module provides the error handling for the library:
//! - [`Error`], the crate-wide error returned by fallible operations
//! - [`DatabaseError`] for state store persistence failures
//! - [`TransferError`] and [`ErrorKind`], the classified failure that travels
//!   from a task through its batch up to the orchestrator listeners

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for batch-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for batch-dl
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "temp_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Archive extraction failed
    #[error("extraction failed for {archive}: {reason}")]
    Extraction {
        /// Path to the archive that failed to extract
        archive: PathBuf,
        /// Reason for the failure
        reason: String,
    },

    /// A classified transfer failure
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// The orchestrator has been destroyed and no longer accepts requests
    #[error("shutdown in progress: orchestrator no longer accepts requests")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Failure classes reported to listeners
///
/// The task is the only classification boundary: whatever reaches it that
/// is not already `Load` or `Archive` is reported as `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorKind {
    /// Network, I/O or HTTP status failure
    Load,
    /// Archive extraction failure
    Archive,
    /// Any failure not classified by the executor
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Load => "LOAD",
            ErrorKind::Archive => "ARCHIVE",
            ErrorKind::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A classified failure of a single transfer
///
/// Batches surface this unchanged; the orchestrator dispatches it to the
/// listener matching [`TransferError::kind`].
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TransferError {
    /// Failure class
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
}

impl TransferError {
    /// Create a transfer error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Network, I/O or HTTP status failure
    pub fn load(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Load, message)
    }

    /// Archive extraction failure
    pub fn archive(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Archive, message)
    }

    /// Unclassified failure
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_serializes_as_uppercase_name() {
        let json = serde_json::to_string(&ErrorKind::Archive).unwrap();
        assert_eq!(json, "\"ARCHIVE\"");

        let kind: ErrorKind = serde_json::from_str("\"LOAD\"").unwrap();
        assert_eq!(kind, ErrorKind::Load);
    }

    #[test]
    fn transfer_error_display_includes_kind_and_message() {
        let err = TransferError::load("code: 404, respMsg: Not Found");
        assert_eq!(err.to_string(), "LOAD: code: 404, respMsg: Not Found");
    }

    #[test]
    fn transfer_error_converts_into_crate_error() {
        let err: Error = TransferError::unknown("worker panicked").into();
        match err {
            Error::Transfer(inner) => assert_eq!(inner.kind, ErrorKind::Unknown),
            other => panic!("expected Transfer variant, got {other:?}"),
        }
    }
}
