//! Database module for SQLite persistence of the local store and the
//! checkpoint.

mod pool;
mod records;
mod state;

pub use pool::*;
pub use records::*;
pub use state::*;

use crate::checkpoint::{CheckpointStore, CHECKPOINT_KEY};
use crate::error::Result;
use crate::local::{LocalStore, MergeFn, MutationEvent, MUTATION_FEED_CAPACITY};
use async_trait::async_trait;
use sitesync_engine::{EntityKind, MergePlan, Record, RecordId, SyncCheckpoint, Timestamp};
use tokio::sync::broadcast;

/// Local store and checkpoint store backed by one SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
    events: broadcast::Sender<MutationEvent>,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        tracing::debug!(database_url, "Running database migrations");
        run_migrations(&pool).await?;
        Ok(Self::with_pool(pool))
    }

    /// Wrap an already migrated pool.
    pub fn with_pool(pool: Pool) -> Self {
        let (events, _) = broadcast::channel(MUTATION_FEED_CAPACITY);
        Self { pool, events }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Number of stored records of a kind, tombstones included.
    pub async fn count(&self, kind: EntityKind) -> Result<u64> {
        let count = count_records(&self.pool, kind).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn announce(&self, kind: EntityKind, id: RecordId) {
        let _ = self.events.send(MutationEvent { kind, id });
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        get_record(&self.pool, kind, id)
            .await?
            .map(|stored| stored.to_record())
            .transpose()
    }

    async fn put(&self, kind: EntityKind, record: Record) -> Result<()> {
        upsert_record(&self.pool, kind, &record).await?;
        self.announce(kind, record.id);
        Ok(())
    }

    async fn bulk_put(&self, kind: EntityKind, records: Vec<Record>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in &records {
            upsert_record(&mut *tx, kind, record).await?;
        }
        tx.commit().await?;

        for record in records {
            self.announce(kind, record.id);
        }
        Ok(())
    }

    async fn soft_delete(&self, kind: EntityKind, id: &str, at: Timestamp) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(stored) = get_record(&mut *tx, kind, id).await? else {
            return Ok(false);
        };
        let mut record = stored.to_record()?;
        if record.is_tombstone() {
            return Ok(false);
        }
        record.mark_deleted(at);
        upsert_record(&mut *tx, kind, &record).await?;
        tx.commit().await?;

        self.announce(kind, record.id);
        Ok(true)
    }

    async fn scan(&self, kind: EntityKind) -> Result<Vec<Record>> {
        get_records(&self.pool, kind)
            .await?
            .iter()
            .map(StoredRecord::to_record)
            .collect()
    }

    async fn apply_merge(
        &self,
        kind: EntityKind,
        ids: Vec<RecordId>,
        merge: MergeFn,
    ) -> Result<MergePlan> {
        let mut tx = self.pool.begin().await?;

        let local = get_records_by_id(&mut tx, kind, &ids)
            .await?
            .iter()
            .map(StoredRecord::to_record)
            .collect::<Result<Vec<_>>>()?;

        let plan = merge(local);
        for record in &plan.writes {
            upsert_record(&mut *tx, kind, record).await?;
        }
        tx.commit().await?;

        Ok(plan)
    }

    fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn get_checkpoint(&self) -> Result<SyncCheckpoint> {
        let Some(value) = get_state(&self.pool, CHECKPOINT_KEY).await? else {
            return Ok(SyncCheckpoint::NEVER);
        };
        match SyncCheckpoint::parse(&value) {
            Ok(checkpoint) => Ok(checkpoint),
            Err(err) => {
                tracing::warn!(value = %value, error = %err, "Unreadable checkpoint, resyncing from scratch");
                Ok(SyncCheckpoint::NEVER)
            }
        }
    }

    async fn set_checkpoint(&self, at: Timestamp) -> Result<()> {
        let value = sitesync_engine::checkpoint::format_timestamp(at);
        set_state(&self.pool, CHECKPOINT_KEY, &value).await?;
        Ok(())
    }

    async fn clear_checkpoint(&self) -> Result<()> {
        delete_state(&self.pool, CHECKPOINT_KEY).await?;
        Ok(())
    }
}
