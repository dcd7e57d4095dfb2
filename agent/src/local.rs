//! The local store seam and its in-memory implementation.

use crate::error::Result;
use async_trait::async_trait;
use sitesync_engine::{EntityKind, MergePlan, Record, RecordId, Store, SyncEntity, Timestamp};
use tokio::sync::{broadcast, Mutex};

/// Capacity of the mutation feed. Slow subscribers see `Lagged` instead of
/// blocking writers.
pub const MUTATION_FEED_CAPACITY: usize = 256;

/// An application write to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    pub kind: EntityKind,
    pub id: RecordId,
}

/// The pure merge run inside [`LocalStore::apply_merge`], fed the current
/// local copies of the requested ids.
pub type MergeFn = Box<dyn FnOnce(Vec<Record>) -> MergePlan + Send>;

/// Embedded local database holding every entity kind.
///
/// Application writes (`put`, `bulk_put`, `soft_delete`) are announced on the
/// mutation feed. Writes made by [`apply_merge`](LocalStore::apply_merge) are
/// not.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Get a record, tombstones included.
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>>;

    /// Insert or replace a record.
    async fn put(&self, kind: EntityKind, record: Record) -> Result<()>;

    /// Insert or replace many records in one transaction.
    async fn bulk_put(&self, kind: EntityKind, records: Vec<Record>) -> Result<()>;

    /// Mark a record deleted at `at`. Returns `false` if it does not exist or
    /// is already deleted.
    async fn soft_delete(&self, kind: EntityKind, id: &str, at: Timestamp) -> Result<bool>;

    /// Every record of a kind, tombstones included, ordered by id.
    async fn scan(&self, kind: EntityKind) -> Result<Vec<Record>>;

    /// Records of a kind matching `predicate`, ordered by id.
    async fn filter(
        &self,
        kind: EntityKind,
        predicate: &(dyn for<'r> Fn(&'r Record) -> bool + Sync),
    ) -> Result<Vec<Record>> {
        let records = self.scan(kind).await?;
        Ok(records.into_iter().filter(|r| predicate(r)).collect())
    }

    /// Read the local copies of `ids`, run `merge` on them and write its
    /// result, all in one transaction.
    async fn apply_merge(
        &self,
        kind: EntityKind,
        ids: Vec<RecordId>,
        merge: MergeFn,
    ) -> Result<MergePlan>;

    /// Subscribe to application writes.
    fn subscribe(&self) -> broadcast::Receiver<MutationEvent>;
}

/// Typed access to a [`LocalStore`]. Writes go through the same path as
/// untyped ones, so they are announced on the mutation feed.
#[async_trait]
pub trait EntityStore {
    async fn get_entity<T: SyncEntity>(&self, id: &str) -> Result<Option<T>>;

    async fn put_entity<T: SyncEntity>(&self, entity: T) -> Result<()>;

    /// Entities of `T`'s kind that are not deleted, ordered by id.
    async fn live_entities<T: SyncEntity>(&self) -> Result<Vec<T>>;
}

#[async_trait]
impl<S: LocalStore + ?Sized> EntityStore for S {
    async fn get_entity<T: SyncEntity>(&self, id: &str) -> Result<Option<T>> {
        match self.get(T::KIND, id).await? {
            Some(record) => Ok(Some(T::from_record(&record)?)),
            None => Ok(None),
        }
    }

    async fn put_entity<T: SyncEntity>(&self, entity: T) -> Result<()> {
        let record = entity.into_record()?;
        self.put(T::KIND, record).await
    }

    async fn live_entities<T: SyncEntity>(&self) -> Result<Vec<T>> {
        let records = self.filter(T::KIND, &|r: &Record| r.is_active()).await?;
        let mut entities = Vec::with_capacity(records.len());
        for record in &records {
            entities.push(T::from_record(record)?);
        }
        Ok(entities)
    }
}

/// A [`LocalStore`] backed by the engine's in-memory [`Store`].
#[derive(Debug)]
pub struct MemoryLocalStore {
    store: Mutex<Store>,
    events: broadcast::Sender<MutationEvent>,
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(MUTATION_FEED_CAPACITY);
        Self {
            store: Mutex::new(Store::new()),
            events,
        }
    }

    /// A copy of the current state.
    pub async fn snapshot(&self) -> Store {
        self.store.lock().await.clone()
    }

    fn announce(&self, kind: EntityKind, id: RecordId) {
        // No subscribers is fine
        let _ = self.events.send(MutationEvent { kind, id });
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        Ok(self.store.lock().await.get(kind, id).cloned())
    }

    async fn put(&self, kind: EntityKind, record: Record) -> Result<()> {
        let id = record.id.clone();
        self.store.lock().await.put(kind, record);
        self.announce(kind, id);
        Ok(())
    }

    async fn bulk_put(&self, kind: EntityKind, records: Vec<Record>) -> Result<()> {
        let ids: Vec<RecordId> = records.iter().map(|r| r.id.clone()).collect();
        self.store.lock().await.bulk_put(kind, records);
        for id in ids {
            self.announce(kind, id);
        }
        Ok(())
    }

    async fn soft_delete(&self, kind: EntityKind, id: &str, at: Timestamp) -> Result<bool> {
        let deleted = self.store.lock().await.soft_delete(kind, id, at).is_some();
        if deleted {
            self.announce(kind, id.to_string());
        }
        Ok(deleted)
    }

    async fn scan(&self, kind: EntityKind) -> Result<Vec<Record>> {
        let store = self.store.lock().await;
        Ok(store
            .query(kind)
            .map(|query| query.include_deleted().all().into_iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply_merge(
        &self,
        kind: EntityKind,
        ids: Vec<RecordId>,
        merge: MergeFn,
    ) -> Result<MergePlan> {
        let mut store = self.store.lock().await;
        let local = ids
            .iter()
            .filter_map(|id| store.get(kind, id).cloned())
            .collect();
        let plan = merge(local);
        store.bulk_put(kind, plan.writes.iter().cloned());
        Ok(plan)
    }

    fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.events.subscribe()
    }
}
