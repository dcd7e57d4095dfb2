//! Durable storage of the sync checkpoint.

use crate::error::Result;
use async_trait::async_trait;
use sitesync_engine::{SyncCheckpoint, Timestamp};
use tokio::sync::Mutex;

/// Key under which the checkpoint is persisted.
pub const CHECKPOINT_KEY: &str = "last_sync_at";

/// Persisted single watermark shared by every entity kind.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The committed checkpoint, [`SyncCheckpoint::NEVER`] if none.
    async fn get_checkpoint(&self) -> Result<SyncCheckpoint>;

    /// Commit a new checkpoint.
    async fn set_checkpoint(&self, at: Timestamp) -> Result<()>;

    /// Forget the checkpoint, forcing a full resync.
    async fn clear_checkpoint(&self) -> Result<()>;
}

/// A [`CheckpointStore`] that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    value: Mutex<SyncCheckpoint>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_checkpoint(&self) -> Result<SyncCheckpoint> {
        Ok(*self.value.lock().await)
    }

    async fn set_checkpoint(&self, at: Timestamp) -> Result<()> {
        *self.value.lock().await = SyncCheckpoint::at(at);
        Ok(())
    }

    async fn clear_checkpoint(&self) -> Result<()> {
        *self.value.lock().await = SyncCheckpoint::NEVER;
        Ok(())
    }
}
