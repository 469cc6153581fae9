//! # Cart Engine
//!
//! Owns the terminal's single live cart.
//!
//! ## Thread Safety
//! The cart sits behind `Arc<tokio::sync::Mutex<Cart>>`: every operation
//! holds the lock for its whole duration, including the catalog lookup, so
//! two operations never interleave on the same cart.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        checkout(method)                                 │
//! │                                                                         │
//! │  lock cart ──► to_sale() ──► SaleLedger::commit_checkout(sale)          │
//! │                   │                 │                                   │
//! │              EmptyCart         one SQLite transaction:                  │
//! │                                  re-read stock per line                 │
//! │                                  insert sale                            │
//! │                                  decrement stock                        │
//! │                                     │                                   │
//! │                    ┌────────────────┴───────────────┐                   │
//! │                    ▼                                ▼                   │
//! │                 failure                          success                │
//! │            cart left intact               cart cleared, sale and        │
//! │                                           touched items queued for push │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use till_core::{now_millis, Cart, CartState, CoreError, Item, PaymentMethod, Sale, TaxRate};
use till_db::{CatalogRepository, SaleLedger};
use till_sync::{PushJob, SyncCoordinator};

use crate::error::ApiResult;

#[derive(Clone)]
pub struct CartEngine {
    cart: Arc<Mutex<Cart>>,
    catalog: CatalogRepository,
    ledger: SaleLedger,
    coordinator: SyncCoordinator,
}

impl CartEngine {
    pub fn new(
        catalog: CatalogRepository,
        ledger: SaleLedger,
        coordinator: SyncCoordinator,
        tax_rate: TaxRate,
    ) -> Self {
        CartEngine {
            cart: Arc::new(Mutex::new(Cart::new(tax_rate))),
            catalog,
            ledger,
            coordinator,
        }
    }

    /// Adds `quantity` units of the item, merging into an existing line.
    pub async fn add_item(&self, item_id: &str, quantity: i64) -> ApiResult<Cart> {
        let mut cart = self.cart.lock().await;
        let item = self.lookup(item_id).await?;

        cart.add(&item, quantity)?;
        debug!(item_id = %item_id, quantity, lines = cart.line_count(), "Added to cart");
        Ok(cart.clone())
    }

    /// Sets a line's quantity against live stock. `quantity <= 0` removes it.
    pub async fn update_quantity(&self, item_id: &str, quantity: i64) -> ApiResult<Cart> {
        let mut cart = self.cart.lock().await;

        if quantity <= 0 {
            cart.remove(item_id)?;
        } else {
            let item = self.lookup(item_id).await?;
            cart.set_quantity(&item, quantity)?;
        }

        debug!(item_id = %item_id, quantity, "Cart quantity updated");
        Ok(cart.clone())
    }

    pub async fn remove_item(&self, item_id: &str) -> ApiResult<Cart> {
        let mut cart = self.cart.lock().await;
        cart.remove(item_id)?;
        Ok(cart.clone())
    }

    pub async fn clear(&self) {
        self.cart.lock().await.clear();
    }

    pub async fn snapshot(&self) -> Cart {
        self.cart.lock().await.clone()
    }

    pub async fn state(&self) -> CartState {
        self.cart.lock().await.state()
    }

    /// Commits the cart as a sale.
    ///
    /// The cart is cleared only once the sale and its stock decrements are
    /// durable. Remote pushes are queued afterwards and never fail the call.
    pub async fn checkout(&self, payment_method: PaymentMethod) -> ApiResult<Sale> {
        let mut cart = self.cart.lock().await;

        let sale = cart.to_sale(payment_method, now_millis())?;
        self.ledger.commit_checkout(&sale).await?;
        cart.clear();
        drop(cart);

        info!(id = %sale.id, total = %sale.total, method = %sale.payment_method, "Sale completed");

        self.coordinator.enqueue(PushJob::Sale(sale.clone())).await;
        for line in &sale.lines {
            match self.catalog.get_by_id(&line.item_id).await {
                Ok(Some(item)) => self.coordinator.enqueue(PushJob::UpsertItem(item)).await,
                Ok(None) => {}
                Err(e) => warn!(item_id = %line.item_id, error = %e, "Stock push skipped"),
            }
        }

        Ok(sale)
    }

    async fn lookup(&self, item_id: &str) -> ApiResult<Item> {
        let item = self
            .catalog
            .get_by_id(item_id)
            .await?
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))?;
        Ok(item)
    }
}
