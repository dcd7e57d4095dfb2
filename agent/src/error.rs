//! Unified error handling for the agent.

use crate::remote::RemoteError;
use sitesync_engine::EntityKind;

/// Agent error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Local store error: {0}")]
    Local(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Engine error: {0}")]
    Engine(#[from] sitesync_engine::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Push failed for {}", kind_list(.0))]
    PushFailed(Vec<EntityKind>),
}

impl SyncError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::PushFailed(_) => true,
            SyncError::Remote(err) => err.is_transient(),
            _ => false,
        }
    }
}

fn kind_list(kinds: &[EntityKind]) -> String {
    kinds
        .iter()
        .map(|kind| kind.table())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, SyncError>;
