//! Push-candidate selection and sanitizing of local records for upload.

use crate::{
    checkpoint::format_timestamp, EntityDescriptor, EntityKind, FieldMap, Record, RecordId,
    SyncCheckpoint, Timestamp,
};
use serde_json::Value;
use uuid::Uuid;

/// A sanitized row ready for the remote upsert.
pub type RemoteRow = FieldMap;

/// Why a candidate was held back from upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A required remote-side column has not been produced yet
    MissingRequired(&'static str),
}

/// Outcome of sanitizing one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Sanitized {
    Upload(RemoteRow),
    Skip(SkipReason),
}

/// Rows to upload for one entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct PushPlan {
    pub kind: EntityKind,
    /// Number of records selected as candidates
    pub candidates: usize,
    /// Sanitized rows, in candidate order
    pub rows: Vec<RemoteRow>,
    /// Candidates held back, with the reason
    pub skipped: Vec<(RecordId, SkipReason)>,
}

impl PushPlan {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Canonical string form of an identifier value.
///
/// Numbers become their decimal form, strings are trimmed, and UUIDs are
/// lower-cased and hyphenated. Anything else is not an identifier.
pub fn canonical_id(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if raw.is_empty() {
        return None;
    }
    match Uuid::parse_str(&raw) {
        Ok(uuid) => Some(uuid.hyphenated().to_string()),
        Err(_) => Some(raw),
    }
}

/// Select the records of one kind that changed since `checkpoint`.
pub fn select_candidates<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    checkpoint: SyncCheckpoint,
) -> Vec<&'a Record> {
    records
        .into_iter()
        .filter(|record| checkpoint.needs_push(record))
        .collect()
}

/// Sanitize one record for the remote schema described by `descriptor`.
///
/// A record without `updated_at` is stamped with `run_started_at`.
pub fn sanitize(
    record: &Record,
    descriptor: &EntityDescriptor,
    run_started_at: Timestamp,
) -> Sanitized {
    let mut fields = record.fields.clone();

    for column in descriptor.local_only {
        fields.remove(*column);
    }

    for (deprecated, current) in descriptor.renamed {
        if let Some(value) = fields.remove(*deprecated) {
            let current_missing = fields.get(*current).map_or(true, Value::is_null);
            if current_missing {
                fields.insert((*current).to_string(), value);
            }
        }
    }

    fields.retain(|column, _| descriptor.recognizes(column));

    for column in descriptor.id_fields {
        if let Some(value) = fields.get_mut(*column) {
            if !value.is_null() {
                if let Some(id) = canonical_id(value) {
                    *value = Value::String(id);
                }
            }
        }
    }

    for column in descriptor.id_list_fields {
        if let Some(Value::Array(items)) = fields.get_mut(*column) {
            for item in items.iter_mut() {
                if let Some(id) = canonical_id(item) {
                    *item = Value::String(id);
                }
            }
        }
    }

    if let Some(fixup) = descriptor.fixup {
        fixup(&mut fields);
    }

    for column in descriptor.required {
        let present = match fields.get(*column) {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        };
        if !present {
            return Sanitized::Skip(SkipReason::MissingRequired(*column));
        }
    }

    let id = canonical_id(&Value::String(record.id.clone())).unwrap_or_else(|| record.id.clone());
    let updated_at = record.updated_at.unwrap_or(run_started_at);

    fields.insert("id".into(), Value::String(id));
    fields.insert(
        "updated_at".into(),
        Value::String(format_timestamp(updated_at)),
    );
    fields.insert(
        "deleted_at".into(),
        record
            .deleted_at
            .map_or(Value::Null, |at| Value::String(format_timestamp(at))),
    );

    Sanitized::Upload(fields)
}

/// Select and sanitize the records of one kind for upload.
pub fn plan_push(
    kind: EntityKind,
    records: &[Record],
    checkpoint: SyncCheckpoint,
    run_started_at: Timestamp,
) -> PushPlan {
    let descriptor = kind.descriptor();
    let candidates = select_candidates(records, checkpoint);

    let mut plan = PushPlan {
        kind,
        candidates: candidates.len(),
        rows: Vec::with_capacity(candidates.len()),
        skipped: Vec::new(),
    };

    for record in candidates {
        match sanitize(record, descriptor, run_started_at) {
            Sanitized::Upload(row) => plan.rows.push(row),
            Sanitized::Skip(reason) => plan.skipped.push((record.id.clone(), reason)),
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::parse_timestamp;
    use serde_json::json;

    fn ts(s: &str) -> Timestamp {
        parse_timestamp(s).unwrap()
    }

    fn record(id: &str, value: Value) -> Record {
        Record::new(
            id,
            value.as_object().cloned().unwrap(),
            ts("2024-01-01T10:00:00Z"),
        )
    }

    fn upload(sanitized: Sanitized) -> RemoteRow {
        match sanitized {
            Sanitized::Upload(row) => row,
            Sanitized::Skip(reason) => panic!("unexpected skip: {reason:?}"),
        }
    }

    #[test]
    fn canonical_ids() {
        assert_eq!(canonical_id(&json!(7)), Some("7".into()));
        assert_eq!(canonical_id(&json!("  abc ")), Some("abc".into()));
        assert_eq!(
            canonical_id(&json!("6F9619FF-8B86-D011-B42D-00CF4FC964FF")),
            Some("6f9619ff-8b86-d011-b42d-00cf4fc964ff".into())
        );
        assert_eq!(canonical_id(&json!("")), None);
        assert_eq!(canonical_id(&json!(null)), None);
        assert_eq!(canonical_id(&json!({"id": 1})), None);
    }

    #[test]
    fn strips_blob_and_unknown_columns() {
        let photo = record(
            "PH1",
            json!({
                "task_id": "T1",
                "url": "https://cdn.example/p1.jpg",
                "image_blob": [1, 2, 3],
                "caption": "kitchen"
            }),
        );
        let row = upload(sanitize(
            &photo,
            EntityKind::TaskPhotos.descriptor(),
            ts("2024-01-02T00:00:00Z"),
        ));

        assert!(!row.contains_key("image_blob"));
        assert!(!row.contains_key("caption"));
        assert_eq!(row["url"], "https://cdn.example/p1.jpg");
        assert_eq!(row["id"], "PH1");
        assert_eq!(row["deleted_at"], Value::Null);
    }

    #[test]
    fn skips_photo_without_hosted_url() {
        let descriptor = EntityKind::TaskPhotos.descriptor();
        let now = ts("2024-01-02T00:00:00Z");

        for url in [json!(null), json!(""), json!("   ")] {
            let photo = record("PH1", json!({"task_id": "T1", "url": url, "image_blob": [1]}));
            assert_eq!(
                sanitize(&photo, descriptor, now),
                Sanitized::Skip(SkipReason::MissingRequired("url"))
            );
        }

        let photo = record("PH2", json!({"task_id": "T1"}));
        assert!(matches!(sanitize(&photo, descriptor, now), Sanitized::Skip(_)));
    }

    #[test]
    fn renames_deprecated_columns() {
        let task = record(
            "T1",
            json!({"title": "Check railing", "photos": ["PH1"], "status": "open"}),
        );
        let row = upload(sanitize(
            &task,
            EntityKind::Tasks.descriptor(),
            ts("2024-01-02T00:00:00Z"),
        ));

        assert_eq!(row["description"], "Check railing");
        assert_eq!(row["photo_ids"], json!(["PH1"]));
        assert!(!row.contains_key("title"));
        assert!(!row.contains_key("photos"));
    }

    #[test]
    fn current_column_wins_over_deprecated() {
        let visit = record("V1", json!({"notes": "old", "comment": "new"}));
        let row = upload(sanitize(
            &visit,
            EntityKind::Visits.descriptor(),
            ts("2024-01-02T00:00:00Z"),
        ));
        assert_eq!(row["comment"], "new");
        assert!(!row.contains_key("notes"));
    }

    #[test]
    fn normalizes_identifier_columns() {
        let task = record(
            "T1",
            json!({
                "project_id": 12,
                "visit_id": null,
                "intervenant_id": " 6F9619FF-8B86-D011-B42D-00CF4FC964FF ",
                "photo_ids": [3, "PH2"],
                "status": "todo"
            }),
        );
        let row = upload(sanitize(
            &task,
            EntityKind::Tasks.descriptor(),
            ts("2024-01-02T00:00:00Z"),
        ));

        assert_eq!(row["project_id"], "12");
        assert_eq!(row["visit_id"], Value::Null);
        assert_eq!(row["intervenant_id"], "6f9619ff-8b86-d011-b42d-00cf4fc964ff");
        assert_eq!(row["photo_ids"], json!(["3", "PH2"]));
        assert_eq!(row["status"], "open");
    }

    #[test]
    fn stamps_missing_updated_at() {
        let mut category = record("C1", json!({"name": "Electricity"}));
        category.updated_at = None;
        let row = upload(sanitize(
            &category,
            EntityKind::Categories.descriptor(),
            ts("2024-01-02T00:00:00Z"),
        ));
        assert_eq!(row["updated_at"], "2024-01-02T00:00:00.000000Z");
    }

    #[test]
    fn tombstones_travel_as_deleted_at() {
        let mut project = record("P1", json!({"name": "Loft"}));
        project.mark_deleted(ts("2024-01-03T00:00:00Z"));
        let row = upload(sanitize(
            &project,
            EntityKind::Projects.descriptor(),
            ts("2024-01-04T00:00:00Z"),
        ));
        assert_eq!(row["deleted_at"], "2024-01-03T00:00:00.000000Z");
    }

    #[test]
    fn plan_selects_and_sanitizes() {
        let checkpoint = SyncCheckpoint::at(ts("2024-01-01T09:30:00Z"));
        let mut stale = record("PH0", json!({"task_id": "T1", "url": "u0"}));
        stale.updated_at = Some(ts("2024-01-01T09:00:00Z"));
        let records = vec![
            stale,
            record("PH1", json!({"task_id": "T1", "url": "u1"})),
            record("PH2", json!({"task_id": "T1", "image_blob": [9]})),
        ];

        let plan = plan_push(
            EntityKind::TaskPhotos,
            &records,
            checkpoint,
            ts("2024-01-02T00:00:00Z"),
        );

        assert_eq!(plan.candidates, 2);
        assert_eq!(plan.rows.len(), 1);
        assert_eq!(plan.rows[0]["id"], "PH1");
        assert_eq!(
            plan.skipped,
            vec![("PH2".to_string(), SkipReason::MissingRequired("url"))]
        );
    }
}
