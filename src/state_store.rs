//! Durable completion markers
//!
//! A marker is written when a batch finishes successfully and removed the
//! moment the batch (re)starts. Together with an on-disk check of every
//! task's output it decides whether a batch can be skipped.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::db::Database;
use crate::error::Result;
use crate::types::BatchId;

/// Value stored for a batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Marker {
    /// The batch finished successfully
    Uploaded,
}

impl Marker {
    /// Stored representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Marker::Uploaded => "UPLOADED",
        }
    }

    /// Parse a stored value; anything unrecognised counts as absent
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "UPLOADED" => Some(Marker::Uploaded),
            _ => None,
        }
    }
}

/// Persistence of completion markers
///
/// Mutations must be durable once the returned future resolves.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the marker for a batch
    async fn get(&self, id: &BatchId) -> Result<Option<Marker>>;

    /// Write the marker for a batch
    async fn set(&self, id: &BatchId, marker: Marker) -> Result<()>;

    /// Remove the marker for a batch; removing an absent marker is not an error
    async fn remove(&self, id: &BatchId) -> Result<()>;
}

#[async_trait]
impl StateStore for Database {
    async fn get(&self, id: &BatchId) -> Result<Option<Marker>> {
        Ok(self
            .get_marker(id.as_str())
            .await?
            .and_then(|record| Marker::parse(&record.marker)))
    }

    async fn set(&self, id: &BatchId, marker: Marker) -> Result<()> {
        self.put_marker(id.as_str(), marker.as_str()).await
    }

    async fn remove(&self, id: &BatchId) -> Result<()> {
        self.delete_marker(id.as_str()).await.map(|_| ())
    }
}

/// In-process [`StateStore`], lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    markers: tokio::sync::Mutex<HashMap<BatchId, Marker>>,
}

impl MemoryStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, id: &BatchId) -> Result<Option<Marker>> {
        Ok(self.markers.lock().await.get(id).copied())
    }

    async fn set(&self, id: &BatchId, marker: Marker) -> Result<()> {
        self.markers.lock().await.insert(id.clone(), marker);
        Ok(())
    }

    async fn remove(&self, id: &BatchId) -> Result<()> {
        self.markers.lock().await.remove(id);
        Ok(())
    }
}
