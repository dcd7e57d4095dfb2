//! The remote store seam.
//!
//! The remote side is a set of tables, one per entity kind, reachable through
//! a PostgREST-style API ([`PostgrestRemote`]). [`MemoryRemoteStore`] is an
//! in-process stand-in with call recording and failure injection.

mod memory;
mod postgrest;

pub use memory::{MemoryRemoteStore, RemoteCall, RemoteOp};
pub use postgrest::PostgrestRemote;

use async_trait::async_trait;
use sitesync_engine::{EntityKind, Record, RecordId, RemoteRow, SyncCheckpoint};
use std::time::Duration;

/// Remote backing store holding one table per entity kind.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Live records (`deleted_at` null) with `updated_at` after `since`,
    /// newest first.
    async fn fetch_live(
        &self,
        kind: EntityKind,
        since: SyncCheckpoint,
    ) -> Result<Vec<Record>, RemoteError>;

    /// Identifiers of tombstoned records with `updated_at` after `since`.
    async fn fetch_tombstones(
        &self,
        kind: EntityKind,
        since: SyncCheckpoint,
    ) -> Result<Vec<RecordId>, RemoteError>;

    /// Insert-or-replace `rows`, keyed by `id`.
    async fn upsert(&self, kind: EntityKind, rows: &[RemoteRow]) -> Result<(), RemoteError>;
}

/// Remote store errors.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    /// Whether the failure may go away on its own (network trouble, server
    /// overload) and the call is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            RemoteError::Status { status, .. } => *status == 429 || *status >= 500,
            RemoteError::InvalidPayload(_) => false,
            RemoteError::Timeout(_) | RemoteError::Unavailable(_) => true,
        }
    }
}
