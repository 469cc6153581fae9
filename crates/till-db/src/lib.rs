//! # till-db: Local Store for Till POS
//!
//! Durable, versioned storage on the terminal itself. Every read and write
//! the cashier triggers lands here first; the network is never on the
//! critical path.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till POS Data Flow                               │
//! │                                                                         │
//! │  apps/terminal (CartEngine::checkout)       till-sync (remote changes)  │
//! │       │                                           │                     │
//! │       ▼                                           ▼                     │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     till-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │  LocalStore   │    │ Repositories  │    │  Migrations  │   │   │
//! │  │   │  (store.rs)   │    │               │    │  (embedded)  │   │   │
//! │  │   │               │    │ Catalog       │    │ 0001_catalog │   │   │
//! │  │   │ SqlitePool    │◄───│ SaleLedger    │    │ 0002_ledger  │   │   │
//! │  │   │ StoreTx       │    │               │    │              │   │   │
//! │  │   │ change feed   │    │               │    │              │   │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/pos/till.db                                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - Pool, record operations, transactions, change feed
//! - [`record`] - Collections, indexes and the [`Record`] trait
//! - [`migrations`] - Embedded, versioned schema upgrades
//! - [`repository`] - Catalog and ledger repositories
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use till_db::{LocalStore, StoreConfig};
//!
//! let store = LocalStore::open(StoreConfig::new("path/to/till.db")).await?;
//!
//! let drinks = store.catalog().filter(&ItemFilter::new().category("Drinks")).await?;
//! store.ledger().commit_checkout(&sale).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod record;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use migrations::LATEST_VERSION;
pub use record::{Collection, Index, IndexValue, Record, StoreEvent};
pub use store::{LocalStore, StoreConfig, StoreHandle, StoreTx};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::ledger::SaleLedger;
