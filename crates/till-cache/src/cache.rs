//! # Resource Cache
//!
//! Request policy over a generation-keyed cache.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        handle(request)                                  │
//! │                                                                         │
//! │  non-GET or non-http(s) ───────────────────────────► Passthrough        │
//! │                                                                         │
//! │  cached? ──yes──► cached response                                       │
//! │     │             (+ background refresh under revalidate prefixes)      │
//! │     no                                                                  │
//! │     ▼                                                                   │
//! │  network ──ok──► response (stored when 200 + same-origin)               │
//! │     │                                                                   │
//! │   failed                                                                │
//! │     ├── navigation ──► cached offline page                              │
//! │     ├── image      ──► cached offline image                             │
//! │     └── other      ──► 503 "Content not available offline"             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//! `install` fills the current generation from the manifest's precache
//! list; `activate` then drops every other generation.

use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CacheError, CacheResult};
use crate::http::{Destination, Request, RequestMode, Response};
use crate::manifest::CacheManifest;
use crate::network::Network;
use crate::storage::CacheStorage;

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Offline page, offline image or the `503` placeholder.
    Fallback,
}

/// What `handle` decided.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOutcome {
    /// Not ours; let the request go out untouched.
    Passthrough,
    Respond {
        response: Response,
        source: ResponseSource,
    },
}

impl CacheOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            CacheOutcome::Passthrough => None,
            CacheOutcome::Respond { response, .. } => Some(response),
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            CacheOutcome::Passthrough => None,
            CacheOutcome::Respond { source, .. } => Some(*source),
        }
    }
}

/// Cache policy for the terminal's static assets. Cheap to clone.
#[derive(Clone)]
pub struct ResourceCache {
    manifest: Arc<CacheManifest>,
    origin: Url,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
}

impl ResourceCache {
    pub fn new(
        manifest: CacheManifest,
        origin: Url,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        ResourceCache {
            manifest: Arc::new(manifest),
            origin,
            storage,
            network,
        }
    }

    pub fn manifest(&self) -> &CacheManifest {
        &self.manifest
    }

    pub fn generation(&self) -> &str {
        &self.manifest.generation
    }

    /// Fetches and stores every precache asset.
    ///
    /// All assets are fetched before anything is written; one failure
    /// leaves the generation untouched.
    pub async fn install(&self) -> CacheResult<usize> {
        info!(generation = %self.generation(), assets = self.manifest.precache.len(), "Installing cache");

        let mut fetched = Vec::with_capacity(self.manifest.precache.len());
        for path in &self.manifest.precache {
            let request = Request::get(self.origin.join(path)?);
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| CacheError::InstallFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            if !response.is_cacheable() {
                return Err(CacheError::InstallFailed {
                    path: path.clone(),
                    reason: format!("status {}", response.status),
                });
            }
            fetched.push((request.cache_key(), response));
        }

        let count = fetched.len();
        for (key, response) in fetched {
            self.storage.put(self.generation(), &key, response).await?;
        }

        info!(generation = %self.generation(), count, "Cache installed");
        Ok(count)
    }

    /// Deletes every generation except the current one. Returns how many
    /// were removed.
    pub async fn activate(&self) -> CacheResult<usize> {
        let mut removed = 0;
        for generation in self.storage.generations().await? {
            if generation != self.generation() {
                info!(%generation, "Deleting old cache");
                if self.storage.delete_generation(&generation).await? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    pub async fn handle(&self, request: &Request) -> CacheOutcome {
        if !request.is_get() || !request.is_http() {
            return CacheOutcome::Passthrough;
        }

        let key = request.cache_key();
        if let Some(cached) = self.lookup(&key).await {
            if self.manifest.revalidates(request.url.path()) {
                self.spawn_revalidate(request.clone());
            }
            return CacheOutcome::Respond {
                response: cached,
                source: ResponseSource::Cache,
            };
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store(&key, response.clone()).await;
                }
                CacheOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                }
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network unavailable, falling back");
                CacheOutcome::Respond {
                    response: self.fallback(request).await,
                    source: ResponseSource::Fallback,
                }
            }
        }
    }

    async fn fallback(&self, request: &Request) -> Response {
        let path = if request.mode == RequestMode::Navigate {
            Some(&self.manifest.offline_page)
        } else if request.destination == Destination::Image {
            Some(&self.manifest.offline_image)
        } else {
            None
        };

        let cached = match path.map(|p| self.origin.join(p)) {
            Some(Ok(url)) => self.lookup(&Request::get(url).cache_key()).await,
            _ => None,
        };
        cached.unwrap_or_else(Response::offline_unavailable)
    }

    async fn lookup(&self, key: &str) -> Option<Response> {
        match self.storage.get(self.generation(), key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(%key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store(&self, key: &str, response: Response) {
        if let Err(e) = self.storage.put(self.generation(), key, response).await {
            warn!(%key, error = %e, "Cache write failed");
        }
    }

    fn spawn_revalidate(&self, request: Request) {
        let cache = self.clone();
        tokio::spawn(async move {
            match cache.network.fetch(&request).await {
                Ok(response) if response.is_cacheable() => {
                    debug!(url = %request.url, "Revalidated");
                    cache.store(&request.cache_key(), response).await;
                }
                Ok(response) => {
                    debug!(url = %request.url, status = response.status, "Revalidation not stored");
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Revalidation failed");
                }
            }
        });
    }
}
