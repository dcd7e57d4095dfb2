//! Entity kinds, their foreign-key-safe order, and their remote descriptors.
//!
//! Every kind is bound at compile time to an [`EntityDescriptor`] that lists
//! the columns the remote schema recognizes and the transform applied before
//! upload. There is no runtime lookup by table name on the sync path.

use crate::{error::Result, Error, FieldMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A kind of synchronized entity. One remote table per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Categories,
    Intervenants,
    Projects,
    Visits,
    Tasks,
    TaskPhotos,
}

impl EntityKind {
    /// Parents before children: a kind only references kinds listed before it.
    pub const ORDER: [EntityKind; 6] = [
        EntityKind::Categories,
        EntityKind::Intervenants,
        EntityKind::Projects,
        EntityKind::Visits,
        EntityKind::Tasks,
        EntityKind::TaskPhotos,
    ];

    /// Remote (and local) table name.
    pub fn table(self) -> &'static str {
        self.descriptor().table
    }

    /// Static sync descriptor for this kind.
    pub fn descriptor(self) -> &'static EntityDescriptor {
        match self {
            EntityKind::Categories => &CATEGORIES,
            EntityKind::Intervenants => &INTERVENANTS,
            EntityKind::Projects => &PROJECTS,
            EntityKind::Visits => &VISITS,
            EntityKind::Tasks => &TASKS,
            EntityKind::TaskPhotos => &TASK_PHOTOS,
        }
    }

    /// Position in [`EntityKind::ORDER`].
    pub fn position(self) -> usize {
        Self::ORDER
            .iter()
            .position(|kind| *kind == self)
            .unwrap_or(Self::ORDER.len())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ORDER
            .into_iter()
            .find(|kind| kind.table() == s)
            .ok_or_else(|| Error::UnknownEntityKind(s.to_string()))
    }
}

/// Extra per-kind transform run after the generic sanitizing rules.
pub type FieldFixup = fn(&mut FieldMap);

/// How one entity kind maps onto its remote table.
#[derive(Debug)]
pub struct EntityDescriptor {
    /// The kind this descriptor belongs to
    pub kind: EntityKind,
    /// Remote table name
    pub table: &'static str,
    /// Payload columns the remote schema recognizes, besides `id`,
    /// `updated_at` and `deleted_at`. Anything else is dropped on upload.
    pub columns: &'static [&'static str],
    /// Columns holding a single identifier reference
    pub id_fields: &'static [&'static str],
    /// Columns holding a list of identifier references
    pub id_list_fields: &'static [&'static str],
    /// Deprecated column names and their current replacement
    pub renamed: &'static [(&'static str, &'static str)],
    /// Local-only payloads (binary blobs) that never leave the device
    pub local_only: &'static [&'static str],
    /// Columns that must be produced before the record may be uploaded
    pub required: &'static [&'static str],
    /// Kind-specific value normalization
    pub fixup: Option<FieldFixup>,
}

impl EntityDescriptor {
    /// Whether the remote schema recognizes `column`.
    pub fn recognizes(&self, column: &str) -> bool {
        matches!(column, "id" | "updated_at" | "deleted_at") || self.columns.contains(&column)
    }
}

static CATEGORIES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Categories,
    table: "categories",
    columns: &["name", "created_at"],
    id_fields: &[],
    id_list_fields: &[],
    renamed: &[],
    local_only: &[],
    required: &[],
    fixup: None,
};

static INTERVENANTS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Intervenants,
    table: "intervenants",
    columns: &["name", "color", "created_at"],
    id_fields: &[],
    id_list_fields: &[],
    renamed: &[],
    local_only: &[],
    required: &[],
    fixup: None,
};

static PROJECTS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Projects,
    table: "projects",
    columns: &["name", "address", "created_at"],
    id_fields: &[],
    id_list_fields: &[],
    renamed: &[],
    local_only: &[],
    required: &[],
    fixup: None,
};

static VISITS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Visits,
    table: "visits",
    columns: &[
        "project_id",
        "date",
        "comment",
        "visit_number",
        "ended_at",
        "created_at",
    ],
    id_fields: &["project_id"],
    id_list_fields: &[],
    renamed: &[("notes", "comment")],
    local_only: &[],
    required: &[],
    fixup: None,
};

static TASKS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Tasks,
    table: "tasks",
    columns: &[
        "project_id",
        "visit_id",
        "description",
        "status",
        "intervenant_id",
        "audio_url",
        "photo_ids",
        "observations",
        "created_at",
    ],
    id_fields: &["project_id", "visit_id", "intervenant_id"],
    id_list_fields: &["photo_ids"],
    renamed: &[("title", "description"), ("photos", "photo_ids")],
    local_only: &[],
    required: &[],
    fixup: Some(normalize_task_status),
};

static TASK_PHOTOS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::TaskPhotos,
    table: "task_photos",
    columns: &["task_id", "url", "created_at"],
    id_fields: &["task_id"],
    id_list_fields: &[],
    renamed: &[("image_url", "url")],
    local_only: &["image_blob"],
    required: &["url"],
    fixup: None,
};

/// Tasks once had `todo`/`doing` states; the remote only knows `open`/`done`.
fn normalize_task_status(fields: &mut FieldMap) {
    if let Some(status) = fields.get_mut("status") {
        if matches!(status.as_str(), Some("todo" | "doing")) {
            *status = Value::String("open".into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_is_parents_first() {
        let tables: Vec<_> = EntityKind::ORDER.iter().map(|k| k.table()).collect();
        assert_eq!(
            tables,
            [
                "categories",
                "intervenants",
                "projects",
                "visits",
                "tasks",
                "task_photos"
            ]
        );
        for (i, kind) in EntityKind::ORDER.iter().enumerate() {
            assert_eq!(kind.position(), i);
            assert_eq!(kind.descriptor().kind, *kind);
        }
    }

    #[test]
    fn parse_table_name() {
        assert_eq!(
            "task_photos".parse::<EntityKind>().unwrap(),
            EntityKind::TaskPhotos
        );
        assert_eq!(
            "invoices".parse::<EntityKind>(),
            Err(Error::UnknownEntityKind("invoices".into()))
        );
    }

    #[test]
    fn serde_uses_table_names() {
        let json = serde_json::to_string(&EntityKind::TaskPhotos).unwrap();
        assert_eq!(json, "\"task_photos\"");
    }

    #[test]
    fn recognizes_sync_columns() {
        let descriptor = EntityKind::TaskPhotos.descriptor();
        assert!(descriptor.recognizes("id"));
        assert!(descriptor.recognizes("deleted_at"));
        assert!(descriptor.recognizes("url"));
        assert!(!descriptor.recognizes("image_blob"));
        assert!(!descriptor.recognizes("caption"));
    }

    #[test]
    fn legacy_task_status() {
        let mut fields = json!({"status": "doing"}).as_object().cloned().unwrap();
        normalize_task_status(&mut fields);
        assert_eq!(fields["status"], "open");

        let mut fields = json!({"status": "done"}).as_object().cloned().unwrap();
        normalize_task_status(&mut fields);
        assert_eq!(fields["status"], "done");
    }
}
