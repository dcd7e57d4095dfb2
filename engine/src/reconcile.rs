//! Reconciliation of pulled remote state into local state.
//!
//! This is the core of determinism. Given the local copies of the affected
//! records and what the remote returned for one entity kind, this module
//! produces the exact set of local writes.
//!
//! # Algorithm
//!
//! 1. Deduplicate the live remote records by id, keeping the newest
//! 2. Resolve each against its local copy with last-write-wins
//! 3. Stamp local copies of remote tombstones with the local time
//! 4. Return the writes and what happened
//!
//! Resolution replaces whole records. Two devices editing different fields of
//! the same record concurrently keep only the newer record.

use crate::{Record, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a local/remote pair was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resolution {
    /// Local copy is newer; it stays and remains a push candidate
    LocalWins,
    /// Remote copy replaces (or creates) the local one
    RemoteWins,
}

/// Decide between a local copy and a remote version of the same record.
///
/// Remote wins when there is no local copy or when
/// `remote.updated_at >= local.updated_at`; ties favor the remote. A missing
/// `updated_at` is older than any timestamp.
pub fn resolve(local: Option<&Record>, remote: &Record) -> Resolution {
    match local {
        None => Resolution::RemoteWins,
        Some(local) if remote.updated_at >= local.updated_at => Resolution::RemoteWins,
        Some(_) => Resolution::LocalWins,
    }
}

/// Counters describing one kind's merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    /// Live remote records received
    pub fetched: usize,
    /// Remote tombstone ids received
    pub tombstones: usize,
    /// Remote copies written locally
    pub applied: usize,
    /// Remote copies that won but were identical to the local copy
    pub unchanged: usize,
    /// Local copies that were newer and kept
    pub kept_local: usize,
    /// Local copies newly marked deleted
    pub tombstoned: usize,
}

/// The writes produced by a merge, plus counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    /// Records to write locally (insert or replace)
    pub writes: Vec<Record>,
    pub stats: MergeStats,
}

/// What the remote returned for one entity kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pulled {
    /// Live records, `deleted_at` null
    pub live: Vec<Record>,
    /// Identifiers of tombstoned records
    pub tombstones: Vec<RecordId>,
}

impl Pulled {
    /// Ids whose local copies the merge needs to see.
    pub fn ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self
            .live
            .iter()
            .map(|r| r.id.clone())
            .chain(self.tombstones.iter().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty() && self.tombstones.is_empty()
    }
}

/// Merge pulled remote state into the given local copies.
///
/// `local` holds the current local copies of (some of) the pulled ids;
/// absent ids have no local copy. `now` is the local time used to stamp
/// tombstones. Pure: the caller applies `writes` atomically.
pub fn merge_pulled(local: Vec<Record>, pulled: Pulled, now: Timestamp) -> MergePlan {
    let mut current: HashMap<RecordId, Record> =
        local.into_iter().map(|r| (r.id.clone(), r)).collect();
    let mut written: Vec<RecordId> = Vec::new();
    let mut stats = MergeStats {
        fetched: pulled.live.len(),
        tombstones: pulled.tombstones.len(),
        ..MergeStats::default()
    };

    let mut newest: HashMap<RecordId, Record> = HashMap::new();
    for remote in pulled.live {
        match newest.get(&remote.id) {
            Some(seen) if seen.updated_at >= remote.updated_at => {}
            _ => {
                newest.insert(remote.id.clone(), remote);
            }
        }
    }

    let mut incoming: Vec<Record> = newest.into_values().collect();
    incoming.sort_by(|a, b| a.id.cmp(&b.id));

    for remote in incoming {
        let existing = current.get(&remote.id);
        let identical = existing == Some(&remote);
        match resolve(existing, &remote) {
            Resolution::LocalWins => stats.kept_local += 1,
            Resolution::RemoteWins if identical => stats.unchanged += 1,
            Resolution::RemoteWins => {
                stats.applied += 1;
                written.push(remote.id.clone());
                current.insert(remote.id.clone(), remote);
            }
        }
    }

    let mut tombstones = pulled.tombstones;
    tombstones.sort();
    tombstones.dedup();

    for id in tombstones {
        if let Some(record) = current.get_mut(&id) {
            if record.is_active() {
                record.mark_deleted(now);
                stats.tombstoned += 1;
                if !written.contains(&id) {
                    written.push(id);
                }
            }
        }
    }

    let writes = written
        .into_iter()
        .filter_map(|id| current.remove(&id))
        .collect();

    MergePlan { writes, stats }
}
