//! # Till Terminal Entry Point
//!
//! ## Startup Sequence
//! 1. Initialize tracing (logging)
//! 2. Load terminal.toml and sync.toml (plus `TILL_*` overrides)
//! 3. Open the local store & run migrations
//! 4. Assemble services (cart, catalog, sales)
//! 5. Prepare the resource cache when an asset origin is configured
//! 6. Start the sync coordinator's background tasks
//! 7. Run until Ctrl-C, then shut down in reverse order

use tracing::{error, info};

use till_sync::SyncConfig;
use till_terminal::{init_tracing, open_terminal, prepare_resource_cache, ApiResult, TerminalConfig};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!(error = %e, "Terminal stopped with an error");
        std::process::exit(1);
    }
}

async fn run() -> ApiResult<()> {
    info!("Starting Till POS terminal");

    let config = TerminalConfig::load(None)?;
    let sync_config = SyncConfig::load(None)?;
    info!(device_id = %sync_config.device_id(), "Configuration loaded");

    let terminal = open_terminal(&config, sync_config).await?;
    let _resource_cache = prepare_resource_cache(&config).await?;

    let handle = terminal.coordinator.start().await?;
    info!("Terminal ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    info!("Shutting down");
    handle.shutdown().await;
    terminal.store.close().await;
    Ok(())
}
