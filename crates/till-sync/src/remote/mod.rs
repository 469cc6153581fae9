//! # Remote Stores
//!
//! The multi-device document store and the blob store backups go to.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DocumentStore                          BlobStore                       │
//! │  ─────────────                          ─────────                       │
//! │  list(collection)   → [Document]        upload(path, bytes) → url       │
//! │  put(collection, Document)                                              │
//! │  delete(collection, id, version)                                        │
//! │  tombstones(collection) → [Tombstone]                                   │
//! │  watch()            → RemoteChange stream                               │
//! │                                                                         │
//! │  Document  { id, version (ms), body (JSON record) }                     │
//! │  Tombstone { id, version (ms) }  left behind by delete                  │
//! │                                                                         │
//! │  Per id the newer of document and tombstone survives; a delete wins a   │
//! │  tie.                                                                   │
//! │                                                                         │
//! │  Implementations:                                                       │
//! │  • MemoryRemote  in-process, offline switch, latency injection          │
//! │  • HttpRemote    JSON over HTTP, polled change feed                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use till_db::{Collection, Record};

use crate::error::{SyncError, SyncResult};

pub use http::HttpRemote;
pub use memory::MemoryRemote;

/// A record as the remote store keeps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Last-writer-wins version, ms since epoch.
    pub version: i64,
    pub body: serde_json::Value,
}

impl Document {
    pub fn from_record<R: Record>(record: &R) -> SyncResult<Self> {
        Ok(Document {
            id: record.key().to_string(),
            version: record.version(),
            body: serde_json::to_value(record)?,
        })
    }

    /// Decodes the body, which must agree with the document's id and version.
    pub fn decode<R: Record>(&self) -> SyncResult<R> {
        let record: R = serde_json::from_value(self.body.clone())?;

        if record.key() != self.id {
            return Err(SyncError::SerializationFailed(format!(
                "document {} holds record {}",
                self.id,
                record.key()
            )));
        }
        if record.version() != self.version {
            return Err(SyncError::SerializationFailed(format!(
                "document {} is version {} but its body is version {}",
                self.id,
                self.version,
                record.version()
            )));
        }

        Ok(record)
    }
}

/// What a delete leaves behind, so devices that missed it still see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub id: String,
    /// Deletion stamp, ms since epoch.
    pub version: i64,
}

/// A change published by the remote store.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
    Upsert {
        collection: Collection,
        document: Document,
    },
    Delete {
        collection: Collection,
        id: String,
        /// Deletion stamp, ms since epoch.
        version: i64,
    },
}

impl RemoteChange {
    pub fn collection(&self) -> Collection {
        match self {
            RemoteChange::Upsert { collection, .. } | RemoteChange::Delete { collection, .. } => {
                *collection
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RemoteChange::Upsert { document, .. } => &document.id,
            RemoteChange::Delete { id, .. } => id,
        }
    }
}

/// Remote multi-device document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document of `collection`.
    async fn list(&self, collection: Collection) -> SyncResult<Vec<Document>>;

    /// Creates or replaces a document.
    async fn put(&self, collection: Collection, document: Document) -> SyncResult<()>;

    /// Removes a document. `version` stamps the deletion for other devices.
    async fn delete(&self, collection: Collection, id: &str, version: i64) -> SyncResult<()>;

    /// Deletes of `collection` that no newer document has replaced.
    async fn tombstones(&self, collection: Collection) -> SyncResult<Vec<Tombstone>>;

    /// Subscribes to changes made by any device.
    fn watch(&self) -> broadcast::Receiver<RemoteChange>;
}

/// Remote blob storage for backups.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `contents` at `path` and returns a download URL.
    async fn upload(&self, path: &str, contents: Vec<u8>) -> SyncResult<String>;
}
