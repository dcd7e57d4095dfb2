//! Scheduler tests on a paused tokio clock.

use serde_json::json;
use sitesync_agent::remote::RemoteOp;
use sitesync_agent::{
    LocalStore, ManualClock, MemoryCheckpointStore, MemoryLocalStore, MemoryRemoteStore,
    RetryPolicy, Scheduler, SchedulerOptions, Signal, SyncOptions, Syncer,
};
use sitesync_engine::checkpoint::parse_timestamp;
use sitesync_engine::{EntityKind, Record};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

struct Running {
    local: Arc<MemoryLocalStore>,
    remote: Arc<MemoryRemoteStore>,
    signals: mpsc::Sender<Signal>,
    handle: JoinHandle<()>,
}

fn task(id: &str) -> Record {
    Record::from_value(json!({
        "id": id,
        "description": "check railing",
        "updated_at": "2024-03-01T12:30:00Z",
    }))
    .unwrap()
}

/// Start a scheduler and wait for its startup pull to begin.
async fn start(local: Arc<MemoryLocalStore>) -> Running {
    let remote = Arc::new(MemoryRemoteStore::new());
    let clock = ManualClock::new(parse_timestamp("2024-03-01T12:00:00Z").unwrap());
    let syncer = Syncer::new(
        local.clone(),
        Arc::new(MemoryCheckpointStore::new()),
        Some(remote.clone()),
    )
    .with_clock(Arc::new(clock))
    .with_options(SyncOptions {
        retry: RetryPolicy::once(Duration::from_secs(1)),
        commit_on_partial_failure: true,
    });

    let (signals, receiver) = mpsc::channel(8);
    let scheduler = Scheduler::new(Arc::new(syncer), SchedulerOptions::default());
    let handle = tokio::spawn(scheduler.run(receiver));

    while remote.calls().await.is_empty() {
        tokio::task::yield_now().await;
    }
    sleep(Duration::from_millis(10)).await;

    Running {
        local,
        remote,
        signals,
        handle,
    }
}

async fn upserts(remote: &MemoryRemoteStore) -> Vec<usize> {
    remote
        .calls_of(RemoteOp::Upsert)
        .await
        .into_iter()
        .map(|call| call.rows)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn mutations_within_the_quiet_window_push_once() {
    let running = start(Arc::new(MemoryLocalStore::new())).await;

    for id in ["T1", "T2", "T3"] {
        running.local.put(EntityKind::Tasks, task(id)).await.unwrap();
        sleep(Duration::from_millis(500)).await;
    }

    sleep(Duration::from_secs(1)).await;
    assert!(upserts(&running.remote).await.is_empty());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(upserts(&running.remote).await, [3]);
}

#[tokio::test(start_paused = true)]
async fn push_owed_while_offline_runs_when_back_online() {
    let running = start(Arc::new(MemoryLocalStore::new())).await;

    running.signals.send(Signal::Offline).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    running.local.put(EntityKind::Tasks, task("T1")).await.unwrap();
    sleep(Duration::from_secs(5)).await;
    assert!(upserts(&running.remote).await.is_empty());

    running.signals.send(Signal::Online).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(upserts(&running.remote).await, [1]);
    // Startup pull plus the promoted full run
    assert_eq!(running.remote.calls_of(RemoteOp::FetchLive).await.len(), 12);
}

#[tokio::test(start_paused = true)]
async fn periodic_pull_only_while_visible() {
    let running = start(Arc::new(MemoryLocalStore::new())).await;

    sleep(Duration::from_secs(61)).await;
    assert_eq!(running.remote.calls_of(RemoteOp::FetchLive).await.len(), 12);

    running.signals.send(Signal::Hidden).await.unwrap();
    sleep(Duration::from_secs(120)).await;
    assert_eq!(running.remote.calls_of(RemoteOp::FetchLive).await.len(), 12);

    running.signals.send(Signal::Visible).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(running.remote.calls_of(RemoteOp::FetchLive).await.len(), 18);
}

#[tokio::test(start_paused = true)]
async fn shutdown_pushes_pending_changes_and_stops() {
    let running = start(Arc::new(MemoryLocalStore::new())).await;

    running.local.put(EntityKind::Tasks, task("T1")).await.unwrap();
    running.signals.send(Signal::Shutdown).await.unwrap();
    running.handle.await.unwrap();

    assert_eq!(upserts(&running.remote).await, [1]);
}

#[tokio::test(start_paused = true)]
async fn closed_signal_channel_stops_the_loop() {
    let running = start(Arc::new(MemoryLocalStore::new())).await;

    drop(running.signals);
    running.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unpushed_changes_at_startup_are_pushed_first() {
    let local = Arc::new(MemoryLocalStore::new());
    local.put(EntityKind::Tasks, task("T1")).await.unwrap();

    let running = start(local).await;
    sleep(Duration::from_millis(10)).await;

    // Startup runs a full sync instead of a pull
    assert_eq!(upserts(&running.remote).await, [1]);
}
