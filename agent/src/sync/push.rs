//! Push pass: upload local changes since the checkpoint.

use super::{KindReport, RetryPolicy};
use crate::error::Result;
use crate::local::LocalStore;
use crate::remote::RemoteStore;
use serde::Serialize;
use sitesync_engine::{
    plan_push, sanitize::select_candidates, EntityKind, SyncCheckpoint, Timestamp,
};

/// Rows per upsert request.
pub const UPSERT_BATCH: usize = 500;

/// Counters describing one kind's push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushStats {
    /// Records changed since the checkpoint
    pub candidates: usize,
    /// Rows accepted by the remote
    pub uploaded: usize,
    /// Candidates held back by sanitizing
    pub skipped: usize,
}

/// Outcome of pushing one kind.
pub type PushReport = KindReport<PushStats>;

/// Push every kind, in entity order.
///
/// An upload failure aborts that kind only. A local store failure aborts the
/// pass.
pub(crate) async fn push_all(
    local: &dyn LocalStore,
    remote: &dyn RemoteStore,
    since: SyncCheckpoint,
    started_at: Timestamp,
    retry: &RetryPolicy,
) -> Result<Vec<PushReport>> {
    let mut reports = Vec::with_capacity(EntityKind::ORDER.len());

    for kind in EntityKind::ORDER {
        let records = local.scan(kind).await?;
        let plan = plan_push(kind, &records, since, started_at);

        for (id, reason) in &plan.skipped {
            tracing::debug!(kind = %kind, id = %id, reason = ?reason, "Held back from push");
        }

        let mut stats = PushStats {
            candidates: plan.candidates,
            uploaded: 0,
            skipped: plan.skipped.len(),
        };

        if plan.is_empty() {
            reports.push(PushReport::ok(kind, stats));
            continue;
        }

        let mut failure = None;
        for batch in plan.rows.chunks(UPSERT_BATCH) {
            match retry
                .run("upsert", kind, || remote.upsert(kind, batch))
                .await
            {
                Ok(()) => stats.uploaded += batch.len(),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        match failure {
            None => {
                tracing::info!(
                    kind = %kind,
                    uploaded = stats.uploaded,
                    skipped = stats.skipped,
                    "Pushed"
                );
                reports.push(PushReport::ok(kind, stats));
            }
            Some(err) => {
                tracing::warn!(
                    kind = %kind,
                    uploaded = stats.uploaded,
                    error = %err,
                    "Push failed for kind"
                );
                reports.push(PushReport::failed(kind, err));
            }
        }
    }

    Ok(reports)
}

/// Number of local records of every kind changed since `since`.
pub(crate) async fn count_pending(local: &dyn LocalStore, since: SyncCheckpoint) -> Result<usize> {
    let mut pending = 0;
    for kind in EntityKind::ORDER {
        let records = local.scan(kind).await?;
        pending += select_candidates(&records, since).len();
    }
    Ok(pending)
}
