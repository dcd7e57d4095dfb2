//! Sync runs: capture the start time, pull, push, commit the checkpoint.
//!
//! A [`Syncer`] owns the single-flight gate. At most one run is in flight.
//! Background triggers that find a run in flight are coalesced into one
//! follow-up run executed by the holder; explicit callers wait their turn and
//! get their own report.

mod pull;
mod push;
mod retry;

pub use pull::PullReport;
pub use push::{PushReport, PushStats, UPSERT_BATCH};
pub use retry::RetryPolicy;

use crate::checkpoint::CheckpointStore;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SyncError};
use crate::local::LocalStore;
use crate::remote::RemoteStore;
use serde::Serialize;
use sitesync_engine::{EntityKind, SyncCheckpoint, Timestamp};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, MutexGuard};

/// Which passes a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    Pull,
    Push,
    Full,
}

impl SyncMode {
    pub fn includes_pull(self) -> bool {
        matches!(self, SyncMode::Pull | SyncMode::Full)
    }

    pub fn includes_push(self) -> bool {
        matches!(self, SyncMode::Push | SyncMode::Full)
    }

    /// The smallest mode covering both.
    pub fn union(self, other: SyncMode) -> SyncMode {
        if self == other {
            self
        } else {
            SyncMode::Full
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Pull => "pull",
            SyncMode::Push => "push",
            SyncMode::Full => "full",
        })
    }
}

/// Per-kind outcome: stats on success, the error otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindReport<S> {
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<S>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<S> KindReport<S> {
    pub fn ok(kind: EntityKind, stats: S) -> Self {
        Self {
            kind,
            stats: Some(stats),
            error: None,
        }
    }

    pub fn failed(kind: EntityKind, error: impl fmt::Display) -> Self {
        Self {
            kind,
            stats: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    /// Every kind succeeded
    Completed,
    /// Some kinds failed; the others were synced
    Partial,
    /// No remote store; nothing was done
    NotConfigured,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub mode: SyncMode,
    pub outcome: RunOutcome,
    pub started_at: Timestamp,
    /// Lower bound used by this run
    pub since: SyncCheckpoint,
    pub pulled: Vec<PullReport>,
    pub pushed: Vec<PushReport>,
    /// Checkpoint committed by this run, if any
    pub committed: Option<Timestamp>,
}

impl RunReport {
    fn not_configured(mode: SyncMode, started_at: Timestamp) -> Self {
        Self {
            mode,
            outcome: RunOutcome::NotConfigured,
            started_at,
            since: SyncCheckpoint::NEVER,
            pulled: Vec::new(),
            pushed: Vec::new(),
            committed: None,
        }
    }

    /// Kinds whose pull failed.
    pub fn failed_pulls(&self) -> Vec<EntityKind> {
        failed(&self.pulled)
    }

    /// Kinds whose push failed.
    pub fn failed_pushes(&self) -> Vec<EntityKind> {
        failed(&self.pushed)
    }

    /// Whether the run was attempted and every kind succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

fn failed<S>(reports: &[KindReport<S>]) -> Vec<EntityKind> {
    reports
        .iter()
        .filter(|r| !r.is_ok())
        .map(|r| r.kind)
        .collect()
}

/// Options of the sync runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub retry: RetryPolicy,
    /// Commit the checkpoint even when some kinds failed
    pub commit_on_partial_failure: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            commit_on_partial_failure: true,
        }
    }
}

/// Runs pull and push passes against the local and remote stores.
pub struct Syncer {
    local: Arc<dyn LocalStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
    gate: Mutex<()>,
    queued: std::sync::Mutex<Option<SyncMode>>,
    /// Start of the last run whose push succeeded for every kind. Local
    /// changes up to it are on the remote even if the checkpoint is older.
    pushed_through: std::sync::Mutex<Option<Timestamp>>,
    warned_unconfigured: AtomicBool,
}

impl fmt::Debug for Syncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Syncer")
            .field("configured", &self.is_configured())
            .field("clock", &self.clock)
            .field("options", &self.options)
            .finish()
    }
}

impl Syncer {
    /// Create a syncer. `remote` is `None` when no remote store is
    /// configured; every run is then a no-op.
    pub fn new(
        local: Arc<dyn LocalStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> Self {
        Self {
            local,
            checkpoints,
            remote,
            clock: Arc::new(SystemClock),
            options: SyncOptions::default(),
            gate: Mutex::new(()),
            queued: std::sync::Mutex::new(None),
            pushed_through: std::sync::Mutex::new(None),
            warned_unconfigured: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.remote.is_some()
    }

    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run a full sync (pull then push) now.
    ///
    /// Fails with [`SyncError::PushFailed`] if any kind could not be pushed.
    pub async fn sync_now(&self) -> Result<RunReport> {
        let report = self.run_exclusive(SyncMode::Full).await?;
        push_outcome(report)
    }

    /// Run a pull-only sync now. Runs as a full sync if local changes are
    /// waiting to be pushed.
    pub async fn pull_now(&self) -> Result<RunReport> {
        self.run_exclusive(SyncMode::Pull).await
    }

    /// Run a push-only sync now.
    ///
    /// Fails with [`SyncError::PushFailed`] if any kind could not be pushed.
    pub async fn push_now(&self) -> Result<RunReport> {
        let report = self.run_exclusive(SyncMode::Push).await?;
        push_outcome(report)
    }

    /// Request a run from a background trigger.
    ///
    /// If a run is in flight the request is merged into the follow-up run of
    /// the holder and `None` is returned. Errors are logged, never returned.
    pub async fn trigger(&self, mode: SyncMode) -> Option<RunReport> {
        self.enqueue(mode);
        match self.gate.try_lock() {
            Ok(guard) => self.drain(guard).await,
            Err(_) => {
                tracing::debug!(mode = %mode, "Sync in flight, request coalesced");
                None
            }
        }
    }

    /// The committed checkpoint.
    pub async fn checkpoint(&self) -> Result<SyncCheckpoint> {
        self.checkpoints.get_checkpoint().await
    }

    /// Forget the checkpoint so the next run pulls and pushes everything.
    pub async fn clear_checkpoint(&self) -> Result<()> {
        let _guard = self.gate.lock().await;
        self.checkpoints.clear_checkpoint().await?;
        *self
            .pushed_through
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        tracing::info!("Checkpoint cleared, next sync is a full resync");
        Ok(())
    }

    /// Number of local records changed since they were last pushed.
    pub async fn pending_changes(&self) -> Result<usize> {
        let since = self.checkpoints.get_checkpoint().await?;
        push::count_pending(self.local.as_ref(), self.push_since(since)).await
    }

    /// Lower bound of push candidates: the checkpoint, or the last fully
    /// successful push if that is newer.
    fn push_since(&self, checkpoint: SyncCheckpoint) -> SyncCheckpoint {
        let pushed = *self
            .pushed_through
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        checkpoint.max(SyncCheckpoint::from(pushed))
    }

    async fn run_exclusive(&self, mode: SyncMode) -> Result<RunReport> {
        let guard = self.gate.lock().await;
        let report = self.run_locked(mode).await;
        self.drain(guard).await;
        report
    }

    /// Run every queued request, then release the gate. Re-acquires it when a
    /// request was queued after the last check.
    async fn drain(&self, mut guard: MutexGuard<'_, ()>) -> Option<RunReport> {
        let mut last = None;
        loop {
            while let Some(mode) = self.take_queued() {
                match self.run_locked(mode).await {
                    Ok(report) => last = Some(report),
                    Err(err) => tracing::error!(mode = %mode, error = %err, "Sync run failed"),
                }
            }
            drop(guard);

            if !self.has_queued() {
                return last;
            }
            guard = match self.gate.try_lock() {
                Ok(guard) => guard,
                Err(_) => return last,
            };
        }
    }

    fn enqueue(&self, mode: SyncMode) {
        let mut queued = self.queued.lock().unwrap_or_else(PoisonError::into_inner);
        *queued = Some(match *queued {
            Some(pending) => pending.union(mode),
            None => mode,
        });
    }

    fn take_queued(&self) -> Option<SyncMode> {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn has_queued(&self) -> bool {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// One run. Must be called with the gate held.
    async fn run_locked(&self, mode: SyncMode) -> Result<RunReport> {
        let started_at = self.clock.now();

        let Some(remote) = self.remote.as_deref() else {
            if !self.warned_unconfigured.swap(true, Ordering::Relaxed) {
                tracing::warn!("Remote store not configured, sync is disabled");
            }
            return Ok(RunReport::not_configured(mode, started_at));
        };

        let since = self.checkpoints.get_checkpoint().await?;
        tracing::info!(mode = %mode, since = %since, "Sync started");

        let push_since = self.push_since(since);

        // Committing after a pull would hide unpushed edits from the next
        // push, so a pull with pending edits runs as a full sync.
        let mut mode = mode;
        if mode == SyncMode::Pull {
            let pending = push::count_pending(self.local.as_ref(), push_since).await?;
            if pending > 0 {
                tracing::info!(pending, "Unpushed local changes, pulling and pushing");
                mode = SyncMode::Full;
            }
        }

        let pulled = if mode.includes_pull() {
            pull::pull_all(
                self.local.as_ref(),
                remote,
                since,
                &self.options.retry,
                self.clock.as_ref(),
            )
            .await?
        } else {
            Vec::new()
        };

        let pushed = if mode.includes_push() {
            push::push_all(
                self.local.as_ref(),
                remote,
                push_since,
                started_at,
                &self.options.retry,
            )
            .await?
        } else {
            Vec::new()
        };

        let all_ok = pulled.iter().all(KindReport::is_ok) && pushed.iter().all(KindReport::is_ok);
        let outcome = if all_ok {
            RunOutcome::Completed
        } else {
            RunOutcome::Partial
        };

        if mode.includes_push() && pushed.iter().all(KindReport::is_ok) {
            *self
                .pushed_through
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(started_at);
        }

        // Only a run that pulled may move the checkpoint: remote changes
        // older than it are never fetched again.
        let commit = mode.includes_pull() && (all_ok || self.options.commit_on_partial_failure);
        let committed = if commit {
            self.checkpoints.set_checkpoint(started_at).await?;
            Some(started_at)
        } else {
            None
        };

        let report = RunReport {
            mode,
            outcome,
            started_at,
            since,
            pulled,
            pushed,
            committed,
        };

        tracing::info!(
            mode = %mode,
            outcome = ?report.outcome,
            failed_pulls = ?report.failed_pulls(),
            failed_pushes = ?report.failed_pushes(),
            committed = report.committed.is_some(),
            "Sync finished"
        );

        Ok(report)
    }
}

fn push_outcome(report: RunReport) -> Result<RunReport> {
    let failed = report.failed_pushes();
    if failed.is_empty() {
        Ok(report)
    } else {
        Err(SyncError::PushFailed(failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_union() {
        assert_eq!(SyncMode::Pull.union(SyncMode::Pull), SyncMode::Pull);
        assert_eq!(SyncMode::Push.union(SyncMode::Push), SyncMode::Push);
        assert_eq!(SyncMode::Pull.union(SyncMode::Push), SyncMode::Full);
        assert_eq!(SyncMode::Full.union(SyncMode::Pull), SyncMode::Full);
    }

    #[test]
    fn mode_passes() {
        assert!(SyncMode::Full.includes_pull() && SyncMode::Full.includes_push());
        assert!(!SyncMode::Pull.includes_push());
        assert!(!SyncMode::Push.includes_pull());
    }

    #[test]
    fn report_lists_failures() {
        let report = RunReport {
            mode: SyncMode::Full,
            outcome: RunOutcome::Partial,
            started_at: chrono::Utc::now(),
            since: SyncCheckpoint::NEVER,
            pulled: vec![
                PullReport::ok(EntityKind::Categories, Default::default()),
                PullReport::failed(EntityKind::Visits, "timeout"),
            ],
            pushed: vec![PushReport::failed(EntityKind::TaskPhotos, "400")],
            committed: None,
        };

        assert_eq!(report.failed_pulls(), [EntityKind::Visits]);
        assert_eq!(report.failed_pushes(), [EntityKind::TaskPhotos]);
        assert!(!report.is_success());
        assert!(matches!(
            push_outcome(report),
            Err(SyncError::PushFailed(kinds)) if kinds == [EntityKind::TaskPhotos]
        ));
    }
}
