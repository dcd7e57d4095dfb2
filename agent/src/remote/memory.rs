//! In-process remote store.

use super::{RemoteError, RemoteStore};
use async_trait::async_trait;
use serde_json::Value;
use sitesync_engine::{EntityKind, Record, RecordId, RemoteRow, SyncCheckpoint, Timestamp};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

/// Which remote call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchLive,
    FetchTombstones,
    Upsert,
}

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub kind: EntityKind,
    /// Rows sent, for upserts
    pub rows: usize,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<EntityKind, BTreeMap<RecordId, Record>>,
    calls: Vec<RemoteCall>,
    /// Remaining transient failures per call
    flaky: HashMap<(RemoteOp, EntityKind), u32>,
    /// Calls rejected until healed
    rejected: HashSet<(RemoteOp, EntityKind)>,
    latency: Duration,
}

/// A [`RemoteStore`] kept in memory.
///
/// Every call is recorded. Calls can be made to fail, transiently or for
/// good, and to take a while.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    state: Mutex<State>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a record directly, as another device would.
    pub async fn insert(&self, kind: EntityKind, record: Record) {
        let mut state = self.state.lock().await;
        state
            .tables
            .entry(kind)
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Soft-delete a record directly, as another device would.
    pub async fn soft_delete(&self, kind: EntityKind, id: &str, at: Timestamp) -> bool {
        let mut state = self.state.lock().await;
        match state.tables.entry(kind).or_default().get_mut(id) {
            Some(record) => {
                record.mark_deleted(at);
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> Option<Record> {
        let state = self.state.lock().await;
        state.tables.get(&kind).and_then(|t| t.get(id)).cloned()
    }

    /// Every row of a table, ordered by id.
    pub async fn records(&self, kind: EntityKind) -> Vec<Record> {
        let state = self.state.lock().await;
        state
            .tables
            .get(&kind)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every call made so far.
    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    /// Calls of one type made so far.
    pub async fn calls_of(&self, op: RemoteOp) -> Vec<RemoteCall> {
        let state = self.state.lock().await;
        state.calls.iter().filter(|c| c.op == op).cloned().collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Fail the next `times` calls of `op` on `kind` with a transient error.
    pub async fn fail_next(&self, op: RemoteOp, kind: EntityKind, times: u32) {
        self.state.lock().await.flaky.insert((op, kind), times);
    }

    /// Reject every call of `op` on `kind` until [`heal`](Self::heal).
    pub async fn reject(&self, op: RemoteOp, kind: EntityKind) {
        self.state.lock().await.rejected.insert((op, kind));
    }

    /// Remove all injected failures.
    pub async fn heal(&self) {
        let mut state = self.state.lock().await;
        state.flaky.clear();
        state.rejected.clear();
    }

    /// Delay every call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = latency;
    }

    /// Record the call, wait out the latency, then apply injected failures.
    async fn enter(&self, op: RemoteOp, kind: EntityKind, rows: usize) -> Result<(), RemoteError> {
        let latency = {
            let mut state = self.state.lock().await;
            state.calls.push(RemoteCall { op, kind, rows });
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        if state.rejected.contains(&(op, kind)) {
            return Err(RemoteError::Status {
                status: 400,
                body: format!("{op:?} on {} rejected", kind.table()),
            });
        }
        if let Some(remaining) = state.flaky.get_mut(&(op, kind)) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Unavailable(format!(
                    "{op:?} on {} failed",
                    kind.table()
                )));
            }
        }
        Ok(())
    }

    async fn select<T>(
        &self,
        kind: EntityKind,
        since: SyncCheckpoint,
        tombstones: bool,
        project: impl Fn(&Record) -> T,
    ) -> Vec<T> {
        let state = self.state.lock().await;
        let mut rows: Vec<&Record> = state
            .tables
            .get(&kind)
            .map(|t| {
                t.values()
                    .filter(|r| r.is_tombstone() == tombstones)
                    .filter(|r| match r.updated_at {
                        Some(updated_at) => since.is_after(updated_at),
                        None => since.is_never(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        rows.into_iter().map(project).collect()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_live(
        &self,
        kind: EntityKind,
        since: SyncCheckpoint,
    ) -> Result<Vec<Record>, RemoteError> {
        self.enter(RemoteOp::FetchLive, kind, 0).await?;
        Ok(self.select(kind, since, false, Record::clone).await)
    }

    async fn fetch_tombstones(
        &self,
        kind: EntityKind,
        since: SyncCheckpoint,
    ) -> Result<Vec<RecordId>, RemoteError> {
        self.enter(RemoteOp::FetchTombstones, kind, 0).await?;
        Ok(self.select(kind, since, true, |r| r.id.clone()).await)
    }

    async fn upsert(&self, kind: EntityKind, rows: &[RemoteRow]) -> Result<(), RemoteError> {
        self.enter(RemoteOp::Upsert, kind, rows.len()).await?;

        let incoming = rows
            .iter()
            .map(|row| Record::from_value(Value::Object(row.clone())))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| RemoteError::InvalidPayload(err.to_string()))?;

        let mut state = self.state.lock().await;
        let table = state.tables.entry(kind).or_default();
        for record in incoming {
            match table.get_mut(&record.id) {
                // merge-duplicates: columns sent replace, others stay
                Some(existing) => {
                    existing.updated_at = record.updated_at;
                    existing.deleted_at = record.deleted_at;
                    existing.fields.extend(record.fields);
                }
                None => {
                    table.insert(record.id.clone(), record);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sitesync_engine::checkpoint::parse_timestamp;

    fn row(value: Value) -> RemoteRow {
        value.as_object().cloned().unwrap()
    }

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn live_and_tombstones_are_split() {
        let remote = MemoryRemoteStore::new();
        remote
            .insert(
                EntityKind::Categories,
                record(json!({"id": "C1", "updated_at": "2024-01-10T00:00:00Z"})),
            )
            .await;
        remote
            .insert(
                EntityKind::Categories,
                record(json!({"id": "C2", "updated_at": "2024-01-20T00:00:00Z"})),
            )
            .await;
        remote
            .soft_delete(
                EntityKind::Categories,
                "C1",
                parse_timestamp("2024-02-01T00:00:00Z").unwrap(),
            )
            .await;

        let since = SyncCheckpoint::at(parse_timestamp("2024-01-15T00:00:00Z").unwrap());
        let live = remote.fetch_live(EntityKind::Categories, since).await.unwrap();
        let dead = remote
            .fetch_tombstones(EntityKind::Categories, since)
            .await
            .unwrap();

        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "C2");
        assert_eq!(dead, ["C1"]);
        assert_eq!(remote.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn upsert_merges_columns() {
        let remote = MemoryRemoteStore::new();
        remote
            .insert(
                EntityKind::Projects,
                record(json!({"id": "P1", "name": "Loft", "address": "1 rue Haute", "updated_at": "2024-01-01T00:00:00Z"})),
            )
            .await;

        remote
            .upsert(
                EntityKind::Projects,
                &[row(json!({"id": "P1", "name": "Loft B", "updated_at": "2024-01-02T00:00:00.000Z", "deleted_at": null}))],
            )
            .await
            .unwrap();

        let stored = remote.get(EntityKind::Projects, "P1").await.unwrap();
        assert_eq!(stored.field("name"), Some(&json!("Loft B")));
        assert_eq!(stored.field("address"), Some(&json!("1 rue Haute")));
    }

    #[tokio::test]
    async fn injected_failures() {
        let remote = MemoryRemoteStore::new();
        remote.fail_next(RemoteOp::FetchLive, EntityKind::Tasks, 1).await;
        remote.reject(RemoteOp::Upsert, EntityKind::Tasks).await;

        let err = remote
            .fetch_live(EntityKind::Tasks, SyncCheckpoint::NEVER)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(remote
            .fetch_live(EntityKind::Tasks, SyncCheckpoint::NEVER)
            .await
            .is_ok());

        let err = remote
            .upsert(EntityKind::Tasks, &[row(json!({"id": "T1"}))])
            .await
            .unwrap_err();
        assert!(!err.is_transient());

        remote.heal().await;
        assert!(remote
            .upsert(EntityKind::Tasks, &[row(json!({"id": "T1"}))])
            .await
            .is_ok());
        assert_eq!(remote.calls_of(RemoteOp::Upsert).await.len(), 2);
    }
}
