//! # Sitesync Engine
//!
//! The deterministic core of an offline-first sync engine for a site
//! inspection application (projects, visits, tasks and their photos).
//!
//! This crate decides *what* to write; it never writes anywhere itself. The
//! async runtime that talks to the local database and the remote store lives
//! in the `sitesync-agent` crate.
//!
//! ## Design Principles
//!
//! - **No IO**: Engine has no knowledge of files, network, or platform
//! - **Deterministic**: Same inputs always produce same outputs
//! - **Testable**: Pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! Every entity is moved around as a [`Record`]: a stable identifier, an
//! `updated_at` timestamp, an optional `deleted_at` tombstone and a flat map
//! of payload columns. Typed views ([`Task`], [`Visit`], ...) convert to and
//! from records through [`SyncEntity`].
//!
//! ### Entity order
//!
//! [`EntityKind::ORDER`] lists the kinds parents first
//! (categories, intervenants, projects, visits, tasks, task photos). Pull and
//! push always walk it in that order.
//!
//! ### Checkpoint
//!
//! A single [`SyncCheckpoint`] is shared by every kind. It is captured at the
//! start of a run and committed after it.
//!
//! ### Merging
//!
//! [`merge_pulled`] resolves pulled remote records against local copies with
//! last-write-wins ([`resolve`]) and stamps local copies of remote tombstones.
//!
//! ### Pushing
//!
//! [`plan_push`] selects the records changed since the checkpoint and
//! sanitizes them for the remote schema described by the kind's
//! [`EntityDescriptor`].
//!
//! ## Quick Start
//!
//! ```rust
//! use sitesync_engine::{
//!     checkpoint::parse_timestamp, merge_pulled, plan_push, EntityKind, Pulled, Record,
//!     SyncCheckpoint,
//! };
//! use serde_json::json;
//!
//! let now = parse_timestamp("2024-02-01T00:00:00Z").unwrap();
//!
//! // 1. Merge what the remote returned
//! let remote = Record::from_value(json!({
//!     "id": "C1",
//!     "name": "Electricity",
//!     "updated_at": "2024-01-31T12:00:00Z",
//!     "deleted_at": null,
//! }))
//! .unwrap();
//! let plan = merge_pulled(vec![], Pulled { live: vec![remote], tombstones: vec![] }, now);
//! assert_eq!(plan.writes.len(), 1);
//!
//! // 2. Plan the upload of local changes
//! let push = plan_push(EntityKind::Categories, &plan.writes, SyncCheckpoint::NEVER, now);
//! assert_eq!(push.rows.len(), 1);
//! ```

pub mod checkpoint;
pub mod entity;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod record;
pub mod sanitize;
pub mod store;

// Re-export main types at crate root
pub use checkpoint::SyncCheckpoint;
pub use entity::{EntityDescriptor, EntityKind, FieldFixup};
pub use error::Error;
pub use models::{Category, Intervenant, Project, SyncEntity, Task, TaskPhoto, TaskStatus, Visit};
pub use reconcile::{merge_pulled, resolve, MergePlan, MergeStats, Pulled, Resolution};
pub use record::{FieldMap, Record};
pub use sanitize::{plan_push, sanitize, PushPlan, RemoteRow, Sanitized, SkipReason};
pub use store::{Collection, QueryBuilder, Store};

/// Type aliases for clarity
pub type RecordId = String;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
