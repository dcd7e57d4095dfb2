//! Sitesync Agent - keeps an embedded local store in sync with a remote
//! mirror.
//!
//! The [`Syncer`] runs checkpointed pull and push passes built on
//! `sitesync-engine`. The [`Scheduler`] decides when to run them from
//! connectivity, visibility, periodic and local-mutation triggers.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sitesync_agent::{Config, PostgrestRemote, RemoteStore, SqliteStore, Syncer};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
//! let mut remote: Option<Arc<dyn RemoteStore>> = None;
//! if let Some((url, key)) = config.remote() {
//!     remote = Some(Arc::new(PostgrestRemote::new(url, key, config.request_timeout)?));
//! }
//!
//! let syncer = Syncer::new(store.clone(), store, remote).with_options(config.sync_options());
//! let report = syncer.sync_now().await?;
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod local;
pub mod remote;
pub mod scheduler;
pub mod sync;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use db::SqliteStore;
pub use error::{Result, SyncError};
pub use local::{EntityStore, LocalStore, MemoryLocalStore, MutationEvent};
pub use remote::{MemoryRemoteStore, PostgrestRemote, RemoteError, RemoteStore};
pub use scheduler::{Scheduler, SchedulerOptions, Signal};
pub use sync::{
    KindReport, PullReport, PushReport, PushStats, RetryPolicy, RunOutcome, RunReport, SyncMode,
    SyncOptions, Syncer,
};
