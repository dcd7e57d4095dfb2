//! Sitesync Agent - command line entry point.
//!
//! `run` keeps the local store in sync until Ctrl-C. The other commands run a
//! single sync pass or inspect the sync state.

use clap::{Parser, Subcommand};
use serde::Serialize;
use sitesync_agent::{
    Config, PostgrestRemote, RemoteStore, Scheduler, Signal, SqliteStore, SyncError, Syncer,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "sitesync-agent", version, about = "Offline-first sync agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync in the background until interrupted
    Run,
    /// Pull then push once
    Sync,
    /// Pull remote changes once
    Pull,
    /// Push local changes once
    Push,
    /// Show the checkpoint and the number of unpushed changes
    Status,
    /// Forget the checkpoint so the next sync starts from scratch
    ResetCheckpoint,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    configured: bool,
    checkpoint: Option<String>,
    pending_changes: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitesync_agent=info,sitesync_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "sitesync-agent failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
    let mut remote: Option<Arc<dyn RemoteStore>> = None;
    if let Some((url, key)) = config.remote() {
        remote = Some(Arc::new(PostgrestRemote::new(
            url,
            key,
            config.request_timeout,
        )?));
    }

    let syncer = Arc::new(
        Syncer::new(store.clone(), store.clone(), remote).with_options(config.sync_options()),
    );

    match command {
        Command::Run => {
            let (signals, receiver) = mpsc::channel(16);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, shutting down");
                    let _ = signals.send(Signal::Shutdown).await;
                }
            });

            tracing::info!(database_url = %config.database_url, "Starting sitesync agent");
            Scheduler::new(syncer, config.scheduler_options())
                .run(receiver)
                .await;
        }
        Command::Sync => print_report(syncer.sync_now().await)?,
        Command::Pull => print_report(syncer.pull_now().await)?,
        Command::Push => print_report(syncer.push_now().await)?,
        Command::Status => {
            let status = Status {
                configured: syncer.is_configured(),
                checkpoint: syncer.checkpoint().await?.to_persisted(),
                pending_changes: syncer.pending_changes().await?,
            };
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::ResetCheckpoint => syncer.clear_checkpoint().await?,
    }

    store.close().await;
    Ok(())
}

fn print_report(
    report: Result<sitesync_agent::RunReport, SyncError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = report?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
