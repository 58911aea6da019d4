//! Database layer for batch-dl
//!
//! Handles SQLite persistence of batch completion markers.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`markers`] - Completion marker CRUD

use sqlx::sqlite::SqlitePool;

mod markers;
mod migrations;

/// Completion marker record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MarkerRecord {
    /// Batch identifier
    pub id: String,
    /// Stored marker value (e.g. "UPLOADED")
    pub marker: String,
    /// Unix timestamp of the last write
    pub updated_at: i64,
}

/// Database handle for batch-dl
pub struct Database {
    pool: SqlitePool,
}
