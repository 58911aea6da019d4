//! Completion marker persistence.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{Database, MarkerRecord};

impl Database {
    /// Fetch the marker row stored for a batch, if any
    pub async fn get_marker(&self, id: &str) -> Result<Option<MarkerRecord>> {
        sqlx::query_as::<_, MarkerRecord>(
            r#"
            SELECT id, marker, updated_at FROM completion_markers WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to read completion marker: {}",
                e
            )))
        })
    }

    /// Insert or overwrite the marker for a batch
    pub async fn put_marker(&self, id: &str, marker: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO completion_markers (id, marker, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET marker = excluded.marker, updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(marker)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to write completion marker: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Delete the marker for a batch
    ///
    /// Returns true if a marker was present.
    pub async fn delete_marker(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM completion_markers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete completion marker: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// List every stored marker, oldest write first
    pub async fn list_markers(&self) -> Result<Vec<MarkerRecord>> {
        sqlx::query_as::<_, MarkerRecord>(
            r#"
            SELECT id, marker, updated_at FROM completion_markers ORDER BY updated_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list completion markers: {}",
                e
            )))
        })
    }
}
