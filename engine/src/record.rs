//! The generic record shape shared by every entity kind.

use crate::{error::Result, Error, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload columns of a record, keyed by column name.
pub type FieldMap = Map<String, Value>;

/// A data record, shaped like a row of the remote table.
///
/// Serializes as one flat JSON object: `id`, `updated_at`, `deleted_at` plus
/// every payload column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier, assigned at creation and never reassigned
    pub id: RecordId,
    /// Time of the last create/update. Legacy rows may not carry one.
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    /// Soft delete marker (tombstone)
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
    /// Every other column
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl Record {
    /// Create a live record stamped with `updated_at`.
    pub fn new(id: impl Into<RecordId>, fields: FieldMap, updated_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            updated_at: Some(updated_at),
            deleted_at: None,
            fields,
        }
    }

    /// Parse a record from a JSON row.
    ///
    /// The identifier may arrive as a string or a number; it is normalized to
    /// its canonical string form.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::InvalidRecord("row must be a JSON object".into()));
        };

        let id = map
            .get("id")
            .and_then(crate::sanitize::canonical_id)
            .ok_or(Error::MissingId)?;
        map.insert("id".into(), Value::String(id));

        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Convert into a flat JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("id".into(), Value::String(self.id.clone()));
        map.insert("updated_at".into(), timestamp_value(self.updated_at));
        map.insert("deleted_at".into(), timestamp_value(self.deleted_at));
        Value::Object(map)
    }

    /// Check if record is active (not a tombstone).
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Check if record is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Mark record as deleted at `at`, bumping `updated_at` with it.
    pub fn mark_deleted(&mut self, at: Timestamp) {
        self.deleted_at = Some(at);
        self.updated_at = Some(at);
    }

    /// Set one payload column and bump `updated_at`.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value, at: Timestamp) {
        self.fields.insert(name.into(), value);
        self.updated_at = Some(at);
    }

    /// Get one payload column.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

fn timestamp_value(ts: Option<Timestamp>) -> Value {
    match ts {
        Some(ts) => Value::String(crate::checkpoint::format_timestamp(ts)),
        None => Value::Null,
    }
}
