//! Error types for the sitesync engine.

use crate::RecordId;
use thiserror::Error;

/// All possible errors from the sitesync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Record shape errors
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("record has no identifier")]
    MissingId,

    #[error("record {id} is missing required field '{field}'")]
    MissingRequiredField { id: RecordId, field: String },

    // Value errors
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidRecord(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
