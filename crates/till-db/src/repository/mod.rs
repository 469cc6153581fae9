//! # Repositories
//!
//! Typed access to the two collections of the local store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Terminal service                                                       │
//! │       │                                                                 │
//! │       │  store.catalog().decrement_stock("p3", 2)                       │
//! │       │  store.ledger().commit_checkout(&sale)                          │
//! │       ▼                                                                 │
//! │  CatalogRepository ──┐                                                  │
//! │  SaleLedger ─────────┼──► LocalStore (records, indexes, transactions)   │
//! │                      │                                                  │
//! │  SQLite ◄────────────┘                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Item CRUD, stock, filter, import
//! - [`SaleLedger`](ledger::SaleLedger) - Sales, sync flags, stats, checkout commit

pub mod catalog;
pub mod ledger;
