//! # State Module
//!
//! Service objects of a running terminal. Each one owns only what it
//! needs, so callers hold the narrowest handle for the job.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────────┐    │
//! │  │   CartEngine     │ │  CatalogService  │ │   SalesService       │    │
//! │  │                  │ │                  │ │                      │    │
//! │  │  Arc<Mutex<Cart>>│ │  require_admin   │ │  SaleLedger reads    │    │
//! │  │  commit_checkout │ │  on writes       │ │  stats               │    │
//! │  └────────┬─────────┘ └────────┬─────────┘ └──────────────────────┘    │
//! │           │ enqueue(PushJob)   │                                        │
//! │           └─────────┬──────────┘                                        │
//! │                     ▼                                                   │
//! │            SyncCoordinator (till-sync)                                  │
//! │                                                                         │
//! │  THREAD SAFETY:                                                        │
//! │  • LocalStore: internal connection pool                                │
//! │  • CartEngine: tokio Mutex held across each whole operation            │
//! │  • Session: watch channel, read without locking                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cart;
mod catalog;
mod sales;

pub use cart::CartEngine;
pub use catalog::CatalogService;
pub use sales::SalesService;

use till_core::TaxRate;
use till_db::LocalStore;
use till_sync::{Session, SyncCoordinator};

/// Everything a running terminal exposes.
#[derive(Clone)]
pub struct Terminal {
    pub store: LocalStore,
    pub session: Session,
    pub coordinator: SyncCoordinator,
    pub cart: CartEngine,
    pub catalog: CatalogService,
    pub sales: SalesService,
}

impl Terminal {
    pub fn new(store: LocalStore, coordinator: SyncCoordinator, tax_rate: TaxRate) -> Self {
        let session = coordinator.session().clone();
        Terminal {
            cart: CartEngine::new(store.catalog(), store.ledger(), coordinator.clone(), tax_rate),
            catalog: CatalogService::new(store.catalog(), session.clone(), coordinator.clone()),
            sales: SalesService::new(store.ledger()),
            store,
            session,
            coordinator,
        }
    }
}
