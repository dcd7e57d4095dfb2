//! Typed entities of the inspection domain.
//!
//! Each entity is bound to its [`EntityKind`] and upload descriptor through
//! [`SyncEntity::KIND`] and converts to and from the generic [`Record`] shape
//! the sync engine moves around.

use crate::{error::Result, EntityDescriptor, EntityKind, Error, Record, RecordId, Timestamp};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// An entity the sync engine knows how to move.
pub trait SyncEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The entity kind (remote table) this type is stored in.
    const KIND: EntityKind;

    fn id(&self) -> &str;

    /// Upload rules of this entity's table.
    fn descriptor() -> &'static EntityDescriptor {
        Self::KIND.descriptor()
    }

    /// Convert into the generic record shape.
    fn into_record(self) -> Result<Record> {
        Record::from_value(serde_json::to_value(self)?)
    }

    /// Rebuild from the generic record shape.
    fn from_record(record: &Record) -> Result<Self> {
        serde_json::from_value(record.to_value()).map_err(Error::from)
    }
}

/// Task lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Open,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: RecordId,
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervenant {
    pub id: RecordId,
    pub name: String,
    pub color: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: RecordId,
    pub name: String,
    pub address: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: RecordId,
    pub project_id: RecordId,
    /// Calendar date of the visit, `YYYY-MM-DD`
    pub date: String,
    pub comment: String,
    #[serde(default)]
    pub visit_number: Option<u32>,
    #[serde(default)]
    pub ended_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: RecordId,
    #[serde(default)]
    pub project_id: Option<RecordId>,
    #[serde(default)]
    pub visit_id: Option<RecordId>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub intervenant_id: Option<RecordId>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub photo_ids: Vec<RecordId>,
    #[serde(default)]
    pub observations: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPhoto {
    pub id: RecordId,
    pub task_id: RecordId,
    /// Hosted image, set once the upload pipeline has run
    #[serde(default)]
    pub url: Option<String>,
    /// Compressed image kept on the device only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_blob: Option<Vec<u8>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
}

macro_rules! sync_entity {
    ($($ty:ty => $kind:expr),+ $(,)?) => {
        $(
            impl SyncEntity for $ty {
                const KIND: EntityKind = $kind;

                fn id(&self) -> &str {
                    &self.id
                }
            }
        )+
    };
}

sync_entity! {
    Category => EntityKind::Categories,
    Intervenant => EntityKind::Intervenants,
    Project => EntityKind::Projects,
    Visit => EntityKind::Visits,
    Task => EntityKind::Tasks,
    TaskPhoto => EntityKind::TaskPhotos,
}
