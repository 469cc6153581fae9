//! Cache storage, partitioned by generation.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::error::CacheResult;
use crate::http::Response;

/// Named caches of responses, one per generation.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of every generation that holds a cache.
    async fn generations(&self) -> CacheResult<Vec<String>>;

    async fn get(&self, generation: &str, key: &str) -> CacheResult<Option<Response>>;

    async fn put(&self, generation: &str, key: &str, response: Response) -> CacheResult<()>;

    /// Removes a whole generation. Returns whether it existed.
    async fn delete_generation(&self, generation: &str) -> CacheResult<bool>;
}

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<BTreeMap<String, HashMap<String, Response>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in `generation`.
    pub async fn len(&self, generation: &str) -> usize {
        self.caches
            .read()
            .await
            .get(generation)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn generations(&self) -> CacheResult<Vec<String>> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }

    async fn get(&self, generation: &str, key: &str) -> CacheResult<Option<Response>> {
        Ok(self
            .caches
            .read()
            .await
            .get(generation)
            .and_then(|cache| cache.get(key))
            .cloned())
    }

    async fn put(&self, generation: &str, key: &str, response: Response) -> CacheResult<()> {
        self.caches
            .write()
            .await
            .entry(generation.to_string())
            .or_default()
            .insert(key.to_string(), response);
        Ok(())
    }

    async fn delete_generation(&self, generation: &str) -> CacheResult<bool> {
        Ok(self.caches.write().await.remove(generation).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let storage = MemoryCacheStorage::new();
        storage
            .put("v1", "https://till.local/", Response::ok("text/html", "old"))
            .await
            .unwrap();
        storage
            .put("v2", "https://till.local/", Response::ok("text/html", "new"))
            .await
            .unwrap();

        let v1 = storage.get("v1", "https://till.local/").await.unwrap().unwrap();
        assert_eq!(v1.body, b"old");
        assert_eq!(storage.generations().await.unwrap(), vec!["v1", "v2"]);

        assert!(storage.delete_generation("v1").await.unwrap());
        assert!(!storage.delete_generation("v1").await.unwrap());
        assert!(storage.get("v1", "https://till.local/").await.unwrap().is_none());
        assert_eq!(storage.len("v2").await, 1);
    }
}
