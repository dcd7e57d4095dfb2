//! Pull pass: bring remote changes since the checkpoint into the local store.
//!
//! Fetches for every kind run concurrently. Application is strictly
//! sequential in entity order, one local transaction per kind.

use super::{KindReport, RetryPolicy};
use crate::clock::Clock;
use crate::error::Result;
use crate::local::LocalStore;
use crate::remote::{RemoteError, RemoteStore};
use futures::future::join_all;
use sitesync_engine::{merge_pulled, EntityKind, MergeStats, Pulled, SyncCheckpoint};

/// Outcome of pulling one kind.
pub type PullReport = KindReport<MergeStats>;

/// Fetch live records and tombstones of one kind.
async fn fetch_kind(
    remote: &dyn RemoteStore,
    kind: EntityKind,
    since: SyncCheckpoint,
    retry: &RetryPolicy,
) -> std::result::Result<Pulled, RemoteError> {
    let live = retry
        .run("fetch_live", kind, || remote.fetch_live(kind, since))
        .await?;
    let tombstones = retry
        .run("fetch_tombstones", kind, || remote.fetch_tombstones(kind, since))
        .await?;
    Ok(Pulled { live, tombstones })
}

/// Pull every kind.
///
/// A fetch failure skips that kind only. A local store failure aborts the
/// pass.
pub(crate) async fn pull_all(
    local: &dyn LocalStore,
    remote: &dyn RemoteStore,
    since: SyncCheckpoint,
    retry: &RetryPolicy,
    clock: &dyn Clock,
) -> Result<Vec<PullReport>> {
    let fetched = join_all(
        EntityKind::ORDER
            .iter()
            .map(|kind| fetch_kind(remote, *kind, since, retry)),
    )
    .await;

    let mut reports = Vec::with_capacity(EntityKind::ORDER.len());
    for (kind, fetched) in EntityKind::ORDER.into_iter().zip(fetched) {
        let pulled = match fetched {
            Ok(pulled) => pulled,
            Err(err) => {
                tracing::warn!(kind = %kind, error = %err, "Pull failed, skipping kind");
                reports.push(PullReport::failed(kind, err));
                continue;
            }
        };

        if pulled.is_empty() {
            tracing::debug!(kind = %kind, "Nothing to pull");
            reports.push(PullReport::ok(kind, MergeStats::default()));
            continue;
        }

        let now = clock.now();
        let ids = pulled.ids();
        let plan = local
            .apply_merge(
                kind,
                ids,
                Box::new(move |records| merge_pulled(records, pulled, now)),
            )
            .await?;

        tracing::info!(
            kind = %kind,
            fetched = plan.stats.fetched,
            tombstones = plan.stats.tombstones,
            applied = plan.stats.applied,
            kept_local = plan.stats.kept_local,
            tombstoned = plan.stats.tombstoned,
            "Pulled"
        );
        reports.push(PullReport::ok(kind, plan.stats));
    }

    Ok(reports)
}
