//! Edge case tests for sitesync-engine
//!
//! These tests cover boundary conditions and the sync scenarios the engine
//! must reproduce exactly.

use serde_json::{json, Value};
use sitesync_engine::{
    checkpoint::parse_timestamp, merge_pulled, plan_push, EntityKind, Pulled, Record, Store,
    SyncCheckpoint, Task, TaskStatus, Timestamp,
};

fn ts(s: &str) -> Timestamp {
    parse_timestamp(s).unwrap()
}

fn row(value: Value) -> Record {
    Record::from_value(value).unwrap()
}

// ============================================================================
// Record Shape Edge Cases
// ============================================================================

#[test]
fn numeric_ids_become_strings() {
    let record = row(json!({"id": 42, "name": "Plumbing", "updated_at": "2024-01-01T00:00:00Z"}));
    assert_eq!(record.id, "42");
}

#[test]
fn uuid_ids_are_canonical() {
    let record = row(json!({"id": " 6F9619FF-8B86-D011-B42D-00CF4FC964FF "}));
    assert_eq!(record.id, "6f9619ff-8b86-d011-b42d-00cf4fc964ff");
}

#[test]
fn rows_without_id_are_rejected() {
    assert!(Record::from_value(json!({"name": "orphan"})).is_err());
    assert!(Record::from_value(json!({"id": null})).is_err());
    assert!(Record::from_value(json!([1, 2, 3])).is_err());
}

#[test]
fn legacy_rows_without_updated_at() {
    let record = row(json!({"id": "T1", "status": "todo"}));
    assert_eq!(record.updated_at, None);

    let checkpoint = SyncCheckpoint::at(ts("2030-01-01T00:00:00Z"));
    assert!(checkpoint.needs_push(&record));
}

#[test]
fn unicode_payloads_survive_sanitizing() {
    let names = ["Électricité", "Ремонт", "配管", "🔌 outlets", "Line\nBreak"];
    let records: Vec<Record> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            row(json!({
                "id": format!("C{i}"),
                "name": name,
                "updated_at": "2024-01-01T00:00:00Z",
            }))
        })
        .collect();

    let plan = plan_push(
        EntityKind::Categories,
        &records,
        SyncCheckpoint::NEVER,
        ts("2024-01-02T00:00:00Z"),
    );

    for (row, name) in plan.rows.iter().zip(names) {
        assert_eq!(row["name"], name);
    }
}

// ============================================================================
// Pull Scenarios
// ============================================================================

#[test]
fn first_pull_applies_everything_in_order() {
    let mut store = Store::new();
    let now = ts("2024-03-01T00:00:00Z");
    let mut applied = Vec::new();

    for kind in EntityKind::ORDER {
        let pulled = Pulled {
            live: vec![
                row(json!({"id": format!("{kind}-1"), "updated_at": "2024-01-01T00:00:00Z"})),
                row(json!({"id": format!("{kind}-2"), "updated_at": "2024-01-02T00:00:00Z"})),
            ],
            tombstones: vec![],
        };
        let plan = store.merge(kind, pulled, now);
        assert_eq!(plan.stats.applied, 2);
        assert_eq!(plan.stats.tombstoned, 0);
        applied.push(kind);
    }

    assert_eq!(applied, EntityKind::ORDER);
    assert_eq!(store.record_count(), 12);
}

#[test]
fn newer_local_task_survives_and_stays_pending() {
    let checkpoint = SyncCheckpoint::at(ts("2024-01-01T08:00:00Z"));
    let local = row(json!({"id": "T1", "status": "done", "updated_at": "2024-01-01T10:00:00Z"}));
    let remote = row(json!({"id": "T1", "status": "open", "updated_at": "2024-01-01T09:00:00Z"}));

    let mut store = Store::new();
    store.put(EntityKind::Tasks, local.clone());
    let plan = store.merge(
        EntityKind::Tasks,
        Pulled {
            live: vec![remote],
            tombstones: vec![],
        },
        ts("2024-01-01T11:00:00Z"),
    );

    assert_eq!(plan.stats.kept_local, 1);
    assert_eq!(store.get(EntityKind::Tasks, "T1"), Some(&local));

    let records: Vec<Record> = store
        .query(EntityKind::Tasks)
        .unwrap()
        .all()
        .into_iter()
        .cloned()
        .collect();
    let push = plan_push(
        EntityKind::Tasks,
        &records,
        checkpoint,
        ts("2024-01-01T11:00:00Z"),
    );
    assert_eq!(push.rows.len(), 1);
    assert_eq!(push.rows[0]["status"], "done");
}

#[test]
fn remote_tombstone_after_checkpoint() {
    let checkpoint = SyncCheckpoint::at(ts("2024-01-30T00:00:00Z"));
    let deleted_at = ts("2024-02-01T00:00:00Z");
    assert!(checkpoint.is_after(deleted_at));

    let mut store = Store::new();
    store.put(
        EntityKind::Categories,
        row(json!({"id": "C1", "name": "Electricity", "updated_at": "2024-01-15T00:00:00Z"})),
    );

    let now = ts("2024-02-02T08:00:00Z");
    store.merge(
        EntityKind::Categories,
        Pulled {
            live: vec![],
            tombstones: vec!["C1".into()],
        },
        now,
    );

    let local = store.get(EntityKind::Categories, "C1").unwrap();
    assert_eq!(local.deleted_at, Some(now));
    assert_eq!(
        store
            .query(EntityKind::Categories)
            .unwrap()
            .include_deleted()
            .count(),
        1
    );
}

#[test]
fn tombstone_for_unknown_record_is_ignored() {
    let mut store = Store::new();
    let plan = store.merge(
        EntityKind::Visits,
        Pulled {
            live: vec![],
            tombstones: vec!["V404".into()],
        },
        ts("2024-01-01T00:00:00Z"),
    );
    assert!(plan.writes.is_empty());
    assert!(store.get(EntityKind::Visits, "V404").is_none());
}

#[test]
fn live_and_tombstone_in_same_pull() {
    let mut store = Store::new();
    let now = ts("2024-01-05T00:00:00Z");
    let plan = store.merge(
        EntityKind::Tasks,
        Pulled {
            live: vec![row(json!({"id": "T1", "updated_at": "2024-01-01T00:00:00Z"}))],
            tombstones: vec!["T1".into()],
        },
        now,
    );

    assert_eq!(plan.writes.len(), 1);
    assert_eq!(
        store.get(EntityKind::Tasks, "T1").unwrap().deleted_at,
        Some(now)
    );
}

// ============================================================================
// Push Edge Cases
// ============================================================================

#[test]
fn checkpoint_boundary_is_exclusive() {
    let checkpoint = SyncCheckpoint::at(ts("2024-01-01T10:00:00Z"));
    let records = vec![
        row(json!({"id": "A", "name": "at", "updated_at": "2024-01-01T10:00:00Z"})),
        row(json!({"id": "B", "name": "after", "updated_at": "2024-01-01T10:00:00.001Z"})),
    ];

    let plan = plan_push(
        EntityKind::Categories,
        &records,
        checkpoint,
        ts("2024-01-02T00:00:00Z"),
    );
    assert_eq!(plan.candidates, 1);
    assert_eq!(plan.rows[0]["id"], "B");
}

#[test]
fn empty_kind_plans_nothing() {
    let plan = plan_push(
        EntityKind::TaskPhotos,
        &[],
        SyncCheckpoint::NEVER,
        ts("2024-01-01T00:00:00Z"),
    );
    assert!(plan.is_empty());
    assert_eq!(plan.candidates, 0);
}

#[test]
fn typed_task_round_trips_through_push() {
    use sitesync_engine::SyncEntity;

    let task = Task {
        id: "T1".into(),
        project_id: Some("P1".into()),
        visit_id: Some("V1".into()),
        description: Some("Seal bathroom joints".into()),
        status: TaskStatus::Done,
        intervenant_id: None,
        audio_url: None,
        photo_ids: vec![],
        observations: vec!["silicone cracked".into()],
        created_at: ts("2024-01-01T09:00:00Z"),
        updated_at: ts("2024-01-01T10:00:00Z"),
        deleted_at: None,
    };

    let record = task.clone().into_record().unwrap();
    let plan = plan_push(
        EntityKind::Tasks,
        &[record],
        SyncCheckpoint::NEVER,
        ts("2024-01-02T00:00:00Z"),
    );

    let pulled = Record::from_value(Value::Object(plan.rows[0].clone())).unwrap();
    assert_eq!(Task::from_record(&pulled).unwrap(), task);
}
