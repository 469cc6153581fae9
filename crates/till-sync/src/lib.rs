//! # till-sync: Sync and Backup for Till POS
//!
//! Mirrors the local store to a remote multi-device document store, pulls
//! other terminals' changes back, and uploads snapshot backups.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync Coordinator Architecture                      │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    SyncCoordinator (orchestrator)                │  │
//! │  │                                                                  │  │
//! │  │  sync_now • apply_remote_change • create_backup • enqueue        │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Remote listener│  │  Push worker   │  │  Session watcher       │    │
//! │  │ DocumentStore  │  │  (outbox)      │  │  sign-in sync,         │    │
//! │  │ change feed    │  │  with backoff  │  │  auto-backup timer     │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  REMOTES:  MemoryRemote (in-process)  •  HttpRemote (JSON over HTTP)   │
//! │  CONFLICTS: last writer wins per record, ties go to the remote copy    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`coordinator`] - `SyncCoordinator`, status and background tasks
//! - [`remote`] - Remote document and blob store traits and implementations
//! - [`outbox`] - Push queue and its retry loop
//! - [`backup`] - Snapshot building and blob paths
//! - [`session`] - Signed-in identity and admin rule
//! - [`config`] - Sync configuration (TOML + env)
//! - [`error`] - Sync error types

pub mod backup;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod outbox;
pub mod remote;
pub mod session;

pub use backup::{BackupKind, BackupRecord};
pub use config::SyncConfig;
pub use coordinator::{
    ApplyOutcome, CoordinatorHandle, NoOpEmitter, SyncCoordinator, SyncEventEmitter, SyncPhase,
    SyncReport, SyncStatus,
};
pub use error::{SyncError, SyncResult};
pub use outbox::PushJob;
pub use remote::{
    BlobStore, Document, DocumentStore, HttpRemote, MemoryRemote, RemoteChange, Tombstone,
};
pub use session::{AccessPolicy, Session};
