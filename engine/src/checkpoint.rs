//! The sync checkpoint: one watermark shared by every entity kind.
//!
//! The checkpoint is captured when a run *starts*, so remote writes that land
//! while the run is in flight are still newer than the committed watermark.

use crate::{error::Result, Error, Record, Timestamp};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format a timestamp the way it is persisted and sent to the remote store.
pub fn format_timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an ISO-8601 / RFC 3339 timestamp.
pub fn parse_timestamp(s: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::InvalidTimestamp(s.to_string()))
}

/// Last successfully synced point, or "never synced".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCheckpoint(Option<Timestamp>);

impl SyncCheckpoint {
    /// A checkpoint that has never been committed.
    pub const NEVER: SyncCheckpoint = SyncCheckpoint(None);

    /// Checkpoint at the given time.
    pub fn at(ts: Timestamp) -> Self {
        Self(Some(ts))
    }

    /// Parse a persisted value. An empty string means "never synced".
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Self::NEVER);
        }
        parse_timestamp(s).map(Self::at)
    }

    /// The watermark, if any.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.0
    }

    /// Whether no sync has ever been committed.
    pub fn is_never(&self) -> bool {
        self.0.is_none()
    }

    /// Whether `ts` is strictly newer than the watermark.
    ///
    /// Everything is newer than "never".
    pub fn is_after(&self, ts: Timestamp) -> bool {
        match self.0 {
            Some(mark) => ts > mark,
            None => true,
        }
    }

    /// Whether a local record changed since this checkpoint and must be
    /// pushed.
    ///
    /// Records without `updated_at` always qualify, as do tombstones whose
    /// `deleted_at` is newer than the watermark.
    pub fn needs_push(&self, record: &Record) -> bool {
        if self.is_never() {
            return true;
        }
        match record.updated_at {
            None => true,
            Some(updated_at) if self.is_after(updated_at) => true,
            Some(_) => record.deleted_at.is_some_and(|at| self.is_after(at)),
        }
    }

    /// Persisted form, `None` for "never".
    pub fn to_persisted(&self) -> Option<String> {
        self.0.map(format_timestamp)
    }
}

impl From<Option<Timestamp>> for SyncCheckpoint {
    fn from(value: Option<Timestamp>) -> Self {
        Self(value)
    }
}

impl fmt::Display for SyncCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ts) => f.write_str(&format_timestamp(ts)),
            None => f.write_str("never"),
        }
    }
}
