//! Store - the in-memory state container.
//!
//! The Store holds the records of every entity kind, one [`Collection`] per
//! kind. It has no notion of pending operations: whether a record must be
//! pushed is decided against the [`SyncCheckpoint`](crate::SyncCheckpoint).

use crate::{
    reconcile::{merge_pulled, MergePlan, Pulled},
    EntityKind, Record, RecordId, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// The records of one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    records: HashMap<RecordId, Record>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Get a record by ID, including tombstones.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    /// Get a mutable record by ID.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    /// Insert or replace a record.
    pub fn insert(&mut self, record: Record) {
        self.records.insert(record.id.clone(), record);
    }

    /// Check if a record exists (including deleted).
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Get all active (non-deleted) records.
    pub fn active_records(&self) -> impl Iterator<Item = &Record> {
        self.records.values().filter(|r| r.is_active())
    }

    /// Get all records including deleted.
    pub fn all_records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Count of active records.
    pub fn len(&self) -> usize {
        self.active_records().count()
    }

    /// Check if collection has no active records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every kind's records, keyed by [`EntityKind`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    collections: BTreeMap<EntityKind, Collection>,
}

impl Store {
    /// Create an empty store with a collection for every kind.
    pub fn new() -> Self {
        Self {
            collections: EntityKind::ORDER
                .into_iter()
                .map(|kind| (kind, Collection::new()))
                .collect(),
        }
    }

    /// Get a collection.
    pub fn collection(&self, kind: EntityKind) -> Option<&Collection> {
        self.collections.get(&kind)
    }

    fn collection_mut(&mut self, kind: EntityKind) -> &mut Collection {
        self.collections.entry(kind).or_default()
    }

    /// Get a record, including tombstones.
    pub fn get(&self, kind: EntityKind, id: &str) -> Option<&Record> {
        self.collections.get(&kind).and_then(|c| c.get(id))
    }

    /// Insert or replace a record.
    pub fn put(&mut self, kind: EntityKind, record: Record) {
        self.collection_mut(kind).insert(record);
    }

    /// Insert or replace many records.
    pub fn bulk_put(&mut self, kind: EntityKind, records: impl IntoIterator<Item = Record>) {
        let collection = self.collection_mut(kind);
        for record in records {
            collection.insert(record);
        }
    }

    /// Mark a record deleted at `at`.
    ///
    /// Returns the tombstoned record, or `None` if it does not exist or is
    /// already deleted.
    pub fn soft_delete(&mut self, kind: EntityKind, id: &str, at: Timestamp) -> Option<Record> {
        let record = self.collection_mut(kind).get_mut(id)?;
        if record.is_tombstone() {
            return None;
        }
        record.mark_deleted(at);
        Some(record.clone())
    }

    /// Query records of a kind.
    pub fn query(&self, kind: EntityKind) -> Option<QueryBuilder<'_>> {
        self.collections.get(&kind).map(QueryBuilder::new)
    }

    /// Run a pull merge for one kind against the current local copies and
    /// apply its writes.
    pub fn merge(&mut self, kind: EntityKind, pulled: Pulled, now: Timestamp) -> MergePlan {
        let local = {
            let collection = self.collection_mut(kind);
            pulled
                .ids()
                .iter()
                .filter_map(|id| collection.get(id).cloned())
                .collect()
        };
        let plan = merge_pulled(local, pulled, now);
        self.bulk_put(kind, plan.writes.iter().cloned());
        plan
    }

    /// Total number of records of every kind, tombstones included.
    pub fn record_count(&self) -> usize {
        self.collections.values().map(|c| c.records.len()).sum()
    }
}

/// Builder for querying records of one kind.
///
/// Results are ordered by id so callers see a stable order.
#[derive(Debug)]
pub struct QueryBuilder<'a> {
    collection: &'a Collection,
    include_deleted: bool,
}

impl<'a> QueryBuilder<'a> {
    fn new(collection: &'a Collection) -> Self {
        Self {
            collection,
            include_deleted: false,
        }
    }

    /// Include deleted records in results.
    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &'a Record> + 'a> {
        if self.include_deleted {
            Box::new(self.collection.all_records())
        } else {
            Box::new(self.collection.active_records())
        }
    }

    /// Get all matching records.
    pub fn all(self) -> Vec<&'a Record> {
        let mut records: Vec<_> = self.iter().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Count matching records.
    pub fn count(self) -> usize {
        self.iter().count()
    }

    /// Filter records by a predicate on the flat JSON row.
    pub fn filter<F>(self, predicate: F) -> Vec<&'a Record>
    where
        F: Fn(&Value) -> bool,
    {
        let mut records: Vec<_> = self.iter().filter(|r| predicate(&r.to_value())).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}
