//! # Till Terminal Library
//!
//! Process wiring for one point-of-sale terminal.
//!
//! ## Module Organization
//! ```text
//! till_terminal/
//! ├── lib.rs          ◄─── You are here (tracing, terminal assembly)
//! ├── main.rs         ◄─── Binary entry point
//! ├── config.rs       ◄─── terminal.toml + TILL_DB_PATH
//! ├── state/
//! │   ├── mod.rs      ◄─── Terminal (service bundle)
//! │   ├── cart.rs     ◄─── CartEngine
//! │   ├── catalog.rs  ◄─── CatalogService (admin-gated writes)
//! │   └── sales.rs    ◄─── SalesService (ledger reads, stats)
//! └── error.rs        ◄─── ApiError returned by every service
//! ```

pub mod config;
pub mod error;
pub mod state;

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use till_cache::{HttpNetwork, MemoryCacheStorage, ResourceCache};
use till_db::LocalStore;
use till_sync::{
    BlobStore, DocumentStore, HttpRemote, MemoryRemote, Session, SyncConfig, SyncCoordinator,
};

pub use config::TerminalConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use state::{CartEngine, CatalogService, SalesService, Terminal};

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=till=trace` - Show trace for till crates only
/// - Default: `info,till=debug,sqlx=warn`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,till=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Opens the local store and assembles the services.
///
/// The remote is HTTP when `[remote] url` is set; otherwise an in-process
/// store keeps the terminal fully usable offline.
pub async fn open_terminal(config: &TerminalConfig, sync_config: SyncConfig) -> ApiResult<Terminal> {
    let store_config = config.store_config()?;
    info!(path = ?store_config.database_path, "Opening local store");
    let store = LocalStore::open(store_config).await?;

    let (documents, blobs): (Arc<dyn DocumentStore>, Arc<dyn BlobStore>) =
        match sync_config.remote_url() {
            Some(url) => {
                info!(url = %url, "Using HTTP remote");
                let remote = Arc::new(HttpRemote::new(&sync_config.remote)?);
                (remote.clone(), remote)
            }
            None => {
                info!("No remote configured, running standalone");
                let remote = Arc::new(MemoryRemote::new());
                (remote.clone(), remote)
            }
        };

    let session = Session::new(sync_config.access_policy());
    let coordinator = SyncCoordinator::new(store.clone(), documents, blobs, session, sync_config);

    Ok(Terminal::new(store, coordinator, config.tax_rate()))
}

/// Builds the resource cache for `[assets] origin`, then installs and
/// activates it.
///
/// `None` when no origin is configured. A failed install is logged and the
/// cache is still returned; it fills from the network as requests arrive.
pub async fn prepare_resource_cache(config: &TerminalConfig) -> ApiResult<Option<ResourceCache>> {
    let Some(origin) = config.asset_origin()? else {
        return Ok(None);
    };

    let network = HttpNetwork::new(&origin, Duration::from_secs(config.assets.timeout_secs))?;
    let cache = ResourceCache::new(
        config.cache.clone(),
        origin.clone(),
        Arc::new(MemoryCacheStorage::new()),
        Arc::new(network),
    );

    match cache.install().await {
        Ok(count) => {
            let removed = cache.activate().await?;
            info!(%origin, generation = cache.generation(), count, removed, "Resource cache ready");
        }
        Err(e) => warn!(%origin, error = %e, "Resource cache install failed"),
    }

    Ok(Some(cache))
}
