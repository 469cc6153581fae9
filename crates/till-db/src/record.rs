//! # Collections and Records
//!
//! What the local store keeps, and how each record maps onto a row.
//!
//! ```text
//! ┌─────────────┬────────────┬──────────────────────┬───────────────────────┐
//! │ collection  │ record     │ version              │ indexes               │
//! ├─────────────┼────────────┼──────────────────────┼───────────────────────┤
//! │ catalog     │ Item       │ updatedAt (ms)       │ by_name, by_category  │
//! │ ledger      │ Sale       │ timestamp (ms)       │ by_timestamp, by_synced│
//! └─────────────┴────────────┴──────────────────────┴───────────────────────┘
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use till_core::{Item, Sale};

/// A named group of records with the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Catalog,
    Ledger,
}

impl Collection {
    /// Backing table name.
    pub const fn table(&self) -> &'static str {
        match self {
            Collection::Catalog => "catalog",
            Collection::Ledger => "ledger",
        }
    }

    /// Entity name used in error messages.
    pub const fn entity(&self) -> &'static str {
        match self {
            Collection::Catalog => "Item",
            Collection::Ledger => "Sale",
        }
    }

    pub const ALL: [Collection; 2] = [Collection::Catalog, Collection::Ledger];
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Secondary indexes over record bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    CatalogByName,
    CatalogByCategory,
    LedgerByTimestamp,
    LedgerBySynced,
}

impl Index {
    pub const fn collection(&self) -> Collection {
        match self {
            Index::CatalogByName | Index::CatalogByCategory => Collection::Catalog,
            Index::LedgerByTimestamp | Index::LedgerBySynced => Collection::Ledger,
        }
    }

    /// SQL expression the index is built on.
    ///
    /// Queries must use this exact text for SQLite to pick the index.
    pub const fn expr(&self) -> &'static str {
        match self {
            Index::CatalogByName => "json_extract(body, '$.name')",
            Index::CatalogByCategory => "json_extract(body, '$.category')",
            Index::LedgerByTimestamp => "json_extract(body, '$.timestamp')",
            Index::LedgerBySynced => "json_extract(body, '$.synced')",
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Index::CatalogByName => "catalog_by_name",
            Index::CatalogByCategory => "catalog_by_category",
            Index::LedgerByTimestamp => "ledger_by_timestamp",
            Index::LedgerBySynced => "ledger_by_synced",
        }
    }
}

/// A key looked up in an index.
///
/// JSON booleans come out of `json_extract` as 0/1, so `Bool` binds as an
/// integer.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    Text(String),
    Integer(i64),
    Bool(bool),
}

impl From<&str> for IndexValue {
    fn from(v: &str) -> Self {
        IndexValue::Text(v.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(v: String) -> Self {
        IndexValue::Text(v)
    }
}

impl From<i64> for IndexValue {
    fn from(v: i64) -> Self {
        IndexValue::Integer(v)
    }
}

impl From<bool> for IndexValue {
    fn from(v: bool) -> Self {
        IndexValue::Bool(v)
    }
}

/// A record that lives in one collection.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    const COLLECTION: Collection;

    /// Primary key.
    fn key(&self) -> &str;

    /// Last-writer-wins version in ms since epoch.
    fn version(&self) -> i64;
}

impl Record for Item {
    const COLLECTION: Collection = Collection::Catalog;

    fn key(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.updated_at.timestamp_millis()
    }
}

impl Record for Sale {
    const COLLECTION: Collection = Collection::Ledger;

    fn key(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// A committed change, published on the store's change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Upserted { collection: Collection, id: String },
    Deleted { collection: Collection, id: String },
}

impl StoreEvent {
    pub fn collection(&self) -> Collection {
        match self {
            StoreEvent::Upserted { collection, .. } | StoreEvent::Deleted { collection, .. } => {
                *collection
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            StoreEvent::Upserted { id, .. } | StoreEvent::Deleted { id, .. } => id,
        }
    }
}
