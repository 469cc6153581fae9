//! # till-cache: Resource Cache Layer for Till POS
//!
//! Keeps the terminal's static assets available offline. Independent of the
//! catalog, cart and sync crates: it only sees requests and responses.
//!
//! ## Modules
//!
//! - [`manifest`] - Cache generation and precache list (TOML)
//! - [`cache`] - `ResourceCache`: install, activate and request policy
//! - [`storage`] - Generation-partitioned response storage
//! - [`network`] - Fetching, with an HTTP implementation
//! - [`http`] - Request and response types
//! - [`error`] - Cache error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use till_cache::{CacheManifest, HttpNetwork, MemoryCacheStorage, Request, ResourceCache};
//! use url::Url;
//!
//! # async fn run() -> till_cache::CacheResult<()> {
//! let origin = Url::parse("http://localhost:3000").unwrap();
//! let network = HttpNetwork::new(&origin, Duration::from_secs(10))?;
//! let cache = ResourceCache::new(
//!     CacheManifest::default(),
//!     origin.clone(),
//!     Arc::new(MemoryCacheStorage::new()),
//!     Arc::new(network),
//! );
//!
//! cache.install().await?;
//! cache.activate().await?;
//! let outcome = cache.handle(&Request::navigate(origin.join("/")?)).await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod http;
pub mod manifest;
pub mod network;
pub mod storage;

pub use cache::{CacheOutcome, ResourceCache, ResponseSource};
pub use error::{CacheError, CacheResult};
pub use http::{Destination, Request, RequestMode, Response, ResponseKind};
pub use manifest::{CacheManifest, DEFAULT_GENERATION};
pub use network::{HttpNetwork, Network};
pub use storage::{CacheStorage, MemoryCacheStorage};
