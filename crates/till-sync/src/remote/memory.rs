//! In-process remote store.
//!
//! Shared by every coordinator handed the same `Arc`, which makes it a
//! stand-in for several terminals talking to one backend.
//!
//! Deletes leave a tombstone. A write older than what the remote already
//! holds for that id is dropped and never broadcast.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use till_db::Collection;

use super::{BlobStore, Document, DocumentStore, RemoteChange, Tombstone};
use crate::error::{SyncError, SyncResult};

const CHANGE_CAPACITY: usize = 256;

/// Live documents and tombstones of one collection.
#[derive(Debug, Default)]
struct Shelf {
    documents: BTreeMap<String, Document>,
    tombstones: BTreeMap<String, i64>,
}

impl Shelf {
    fn upsert(&mut self, document: &Document) -> bool {
        if let Some(&deleted) = self.tombstones.get(&document.id) {
            if deleted >= document.version {
                return false;
            }
        }
        self.tombstones.remove(&document.id);
        self.documents.insert(document.id.clone(), document.clone());
        true
    }

    fn delete(&mut self, id: &str, version: i64) -> bool {
        if let Some(current) = self.documents.get(id) {
            if current.version > version {
                return false;
            }
        }
        self.documents.remove(id);
        let stamp = self.tombstones.entry(id.to_string()).or_insert(version);
        *stamp = (*stamp).max(version);
        true
    }
}

#[derive(Debug)]
pub struct MemoryRemote {
    shelves: RwLock<HashMap<Collection, Shelf>>,
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    changes: broadcast::Sender<RemoteChange>,
    online: AtomicBool,
    latency_ms: AtomicU64,
    writes: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        MemoryRemote {
            shelves: RwLock::new(HashMap::new()),
            blobs: RwLock::new(BTreeMap::new()),
            changes,
            online: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// While offline every call fails with `ConnectionFailed`.
    pub fn set_online(&self, online: bool) {
        debug!(online, "Memory remote connectivity changed");
        self.online.store(online, Ordering::SeqCst);
    }

    /// Delay added before every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of successful document writes and deletes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn document(&self, collection: Collection, id: &str) -> Option<Document> {
        self.shelves
            .read()
            .await
            .get(&collection)
            .and_then(|shelf| shelf.documents.get(id))
            .cloned()
    }

    pub async fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(path).cloned()
    }

    pub async fn blob_paths(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }

    /// Applies a change as if another device had made it.
    pub async fn publish(&self, change: RemoteChange) {
        let kept = {
            let mut shelves = self.shelves.write().await;
            match &change {
                RemoteChange::Upsert {
                    collection,
                    document,
                } => shelves.entry(*collection).or_default().upsert(document),
                RemoteChange::Delete {
                    collection,
                    id,
                    version,
                } => shelves.entry(*collection).or_default().delete(id, *version),
            }
        };

        if kept {
            let _ = self.changes.send(change);
        } else {
            debug!(
                collection = %change.collection(),
                id = %change.id(),
                "Remote already holds a newer version, dropping change"
            );
        }
    }

    async fn reach(&self) -> SyncResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(SyncError::ConnectionFailed("remote unreachable".into()));
        }
        Ok(())
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryRemote {
    async fn list(&self, collection: Collection) -> SyncResult<Vec<Document>> {
        self.reach().await?;
        Ok(self
            .shelves
            .read()
            .await
            .get(&collection)
            .map(|shelf| shelf.documents.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn put(&self, collection: Collection, document: Document) -> SyncResult<()> {
        self.reach().await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.publish(RemoteChange::Upsert {
            collection,
            document,
        })
        .await;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str, version: i64) -> SyncResult<()> {
        self.reach().await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.publish(RemoteChange::Delete {
            collection,
            id: id.to_string(),
            version,
        })
        .await;
        Ok(())
    }

    async fn tombstones(&self, collection: Collection) -> SyncResult<Vec<Tombstone>> {
        self.reach().await?;
        Ok(self
            .shelves
            .read()
            .await
            .get(&collection)
            .map(|shelf| {
                shelf
                    .tombstones
                    .iter()
                    .map(|(id, &version)| Tombstone {
                        id: id.clone(),
                        version,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn watch(&self) -> broadcast::Receiver<RemoteChange> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl BlobStore for MemoryRemote {
    async fn upload(&self, path: &str, contents: Vec<u8>) -> SyncResult<String> {
        self.reach().await?;
        self.blobs.write().await.insert(path.to_string(), contents);
        Ok(format!("memory://{}", path))
    }
}
