//! # Sale Ledger
//!
//! Append-only record of completed sales, plus the checkout commit.
//!
//! ## Checkout Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   commit_checkout(sale)                                 │
//! │                                                                         │
//! │  ┌─────────────────────── SINGLE TRANSACTION ───────────────────────┐  │
//! │  │                                                                   │  │
//! │  │  1. for each line: read live item                                │  │
//! │  │       missing          → ItemNotFound                            │  │
//! │  │       qty > stock      → InsufficientStock (names the item)      │  │
//! │  │                                                                   │  │
//! │  │  2. INSERT sale        → UniqueViolation on a reused id          │  │
//! │  │                                                                   │  │
//! │  │  3. for each line: stock -= qty, touch updated_at                │  │
//! │  │                                                                   │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← sale and every decrement land together, or none do           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::catalog::decrement_in;
use crate::error::{DbError, DbResult};
use crate::record::{Collection, Index, IndexValue};
use crate::store::LocalStore;
use till_core::types::now_millis;
use till_core::{
    compute_stats, CoreError, Item, PaymentMethod, Sale, SaleFilter, SalesStats, StatsPeriod,
};

/// Repository for completed sales.
#[derive(Debug, Clone)]
pub struct SaleLedger {
    store: LocalStore,
}

impl SaleLedger {
    pub fn new(store: LocalStore) -> Self {
        SaleLedger { store }
    }

    /// Persists a sale. Never overwrites: a reused id fails.
    pub async fn record(&self, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, total = %sale.total, "Recording sale");
        self.store.insert(sale).await
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        self.store.get_by_id(id).await
    }

    /// Every sale, oldest first.
    pub async fn list_all(&self) -> DbResult<Vec<Sale>> {
        self.list_by_range(None, None).await
    }

    /// Sales with `start <= timestamp <= end`, oldest first.
    pub async fn list_by_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<Sale>> {
        let bound = |t: DateTime<Utc>| IndexValue::Integer(t.timestamp_millis());
        self.store
            .range_by_index(Index::LedgerByTimestamp, start.map(bound), end.map(bound))
            .await
    }

    pub async fn list_by_payment_method(&self, method: PaymentMethod) -> DbResult<Vec<Sale>> {
        self.filter(&SaleFilter::new().payment_method(method)).await
    }

    /// Range from the timestamp index, then the remaining terms in memory.
    pub async fn filter(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let sales = self.list_by_range(filter.start, filter.end).await?;
        Ok(sales.into_iter().filter(|s| filter.matches(s)).collect())
    }

    /// Sales not yet pushed to the remote store.
    pub async fn list_unsynced(&self) -> DbResult<Vec<Sale>> {
        self.store.find_by_index(Index::LedgerBySynced, false).await
    }

    /// Flags a sale as pushed. The only mutation a sale ever sees.
    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        let mut tx = self.store.begin().await?;

        let mut sale: Sale = tx
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found(Collection::Ledger.entity(), id))?;

        if !sale.synced {
            sale.synced = true;
            tx.put(&sale).await?;
        }
        tx.commit().await
    }

    /// Aggregates the sales inside `period` ending at `now`.
    pub async fn stats(&self, period: StatsPeriod, now: DateTime<Utc>) -> DbResult<SalesStats> {
        let sales = self
            .list_by_range(Some(period.window_start(now)), None)
            .await?;
        Ok(compute_stats(&sales))
    }

    /// Records `sale` and takes its quantities out of stock atomically.
    pub async fn commit_checkout(&self, sale: &Sale) -> DbResult<()> {
        if sale.lines.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        let now = now_millis();
        let mut tx = self.store.begin().await?;

        for line in &sale.lines {
            let item: Item = tx
                .get_by_id(&line.item_id)
                .await?
                .ok_or_else(|| CoreError::ItemNotFound(line.item_id.clone()))?;

            if !item.has_stock(line.quantity) {
                return Err(CoreError::InsufficientStock {
                    item_id: item.id,
                    name: item.name,
                    available: item.stock,
                    requested: line.quantity,
                }
                .into());
            }
        }

        tx.insert(sale).await?;

        for line in &sale.lines {
            decrement_in(&mut tx, &line.item_id, line.quantity, now).await?;
        }

        tx.commit().await?;
        info!(
            id = %sale.id,
            lines = sale.lines.len(),
            total = %sale.total,
            method = %sale.payment_method,
            "Checkout committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::catalog::CatalogRepository;
    use crate::store::StoreConfig;
    use chrono::{Duration, TimeZone};
    use till_core::{Cart, ItemForm, ItemPatch, Money, SaleLine, TaxRate};

    async fn setup() -> (CatalogRepository, SaleLedger) {
        let store = LocalStore::open(StoreConfig::in_memory()).await.unwrap();
        (CatalogRepository::new(store.clone()), SaleLedger::new(store))
    }

    fn sale(id: &str, ts: DateTime<Utc>, method: PaymentMethod, lines: Vec<SaleLine>) -> Sale {
        let subtotal: Money = lines.iter().map(|l| l.total_price).sum();
        Sale {
            id: id.to_string(),
            lines,
            subtotal,
            tax_rate: TaxRate::zero(),
            tax_amount: Money::zero(),
            total: subtotal,
            payment_method: method,
            timestamp: ts,
            synced: false,
        }
    }

    fn line(item: &Item, quantity: i64) -> SaleLine {
        SaleLine {
            item_id: item.id.clone(),
            name: item.name.clone(),
            unit_price: item.price,
            quantity,
            total_price: item.price.multiply_quantity(quantity),
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[tokio::test]
    async fn test_record_never_overwrites() {
        let (_, ledger) = setup().await;
        let first = sale("s1", at(1_000), PaymentMethod::Cash, vec![]);
        ledger.record(&first).await.unwrap();

        let mut second = first.clone();
        second.payment_method = PaymentMethod::Card;
        assert!(matches!(
            ledger.record(&second).await,
            Err(DbError::UniqueViolation { .. })
        ));
        assert_eq!(ledger.get_by_id("s1").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_range_and_method_queries() {
        let (_, ledger) = setup().await;
        ledger.record(&sale("s1", at(1_000), PaymentMethod::Cash, vec![])).await.unwrap();
        ledger.record(&sale("s2", at(3_000), PaymentMethod::Card, vec![])).await.unwrap();
        ledger.record(&sale("s3", at(2_000), PaymentMethod::Cash, vec![])).await.unwrap();

        let ids = |sales: Vec<Sale>| sales.into_iter().map(|s| s.id).collect::<Vec<_>>();

        assert_eq!(ids(ledger.list_all().await.unwrap()), vec!["s1", "s3", "s2"]);
        // Inclusive bounds
        assert_eq!(
            ids(ledger.list_by_range(Some(at(2_000)), Some(at(3_000))).await.unwrap()),
            vec!["s3", "s2"]
        );
        assert_eq!(
            ids(ledger.list_by_payment_method(PaymentMethod::Cash).await.unwrap()),
            vec!["s1", "s3"]
        );
        assert_eq!(
            ids(ledger
                .filter(&SaleFilter::new().end(at(2_000)).payment_method(PaymentMethod::Cash))
                .await
                .unwrap()),
            vec!["s1", "s3"]
        );
    }

    #[tokio::test]
    async fn test_unsynced_and_mark_synced() {
        let (_, ledger) = setup().await;
        ledger.record(&sale("s1", at(1_000), PaymentMethod::Cash, vec![])).await.unwrap();
        ledger.record(&sale("s2", at(2_000), PaymentMethod::Cash, vec![])).await.unwrap();

        ledger.mark_synced("s1").await.unwrap();

        let unsynced = ledger.list_unsynced().await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, "s2");
        assert!(ledger.get_by_id("s1").await.unwrap().unwrap().synced);

        assert!(matches!(
            ledger.mark_synced("missing").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stats_window() {
        let (catalog, ledger) = setup().await;
        let coffee = catalog
            .create(ItemForm::new("Coffee", Money::from_cents(250), 100))
            .await
            .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();

        ledger
            .record(&sale("old", now - Duration::days(3), PaymentMethod::Cash, vec![line(&coffee, 4)]))
            .await
            .unwrap();
        ledger
            .record(&sale("new", now - Duration::hours(2), PaymentMethod::Card, vec![line(&coffee, 2)]))
            .await
            .unwrap();

        let day = ledger.stats(StatsPeriod::Day, now).await.unwrap();
        assert_eq!(day.total_sales, 1);
        assert_eq!(day.total_revenue, Money::from_cents(500));

        let week = ledger.stats(StatsPeriod::Week, now).await.unwrap();
        assert_eq!(week.total_sales, 2);
        assert_eq!(week.top_items[0].quantity, 6);
        assert_eq!(week.average_ticket, Money::from_cents(750));
    }

    #[tokio::test]
    async fn test_checkout_decrements_stock() {
        let (catalog, ledger) = setup().await;
        let muffin = catalog
            .create(ItemForm::new("Muffin", Money::from_cents(300), 5))
            .await
            .unwrap();

        let mut cart = Cart::default();
        cart.add(&muffin, 2).unwrap();
        let sale = cart.to_sale(PaymentMethod::Cash, now_millis()).unwrap();

        ledger.commit_checkout(&sale).await.unwrap();

        assert_eq!(catalog.require(&muffin.id).await.unwrap().stock, 3);
        let stored = ledger.get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored.total, cart.total());
    }

    #[tokio::test]
    async fn test_checkout_fails_on_stale_stock() {
        let (catalog, ledger) = setup().await;
        let muffin = catalog
            .create(ItemForm::new("Muffin", Money::from_cents(300), 5))
            .await
            .unwrap();
        let tea = catalog
            .create(ItemForm::new("Tea", Money::from_cents(150), 5))
            .await
            .unwrap();

        let sale = sale(
            "s1",
            now_millis(),
            PaymentMethod::Cash,
            vec![line(&tea, 1), line(&muffin, 4)],
        );

        // Another terminal sold muffins in the meantime
        catalog
            .update(&muffin.id, ItemPatch::new().stock(3))
            .await
            .unwrap();

        let err = ledger.commit_checkout(&sale).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Rule(CoreError::InsufficientStock { ref name, available: 3, requested: 4, .. })
                if name == "Muffin"
        ));

        assert_eq!(catalog.require(&tea.id).await.unwrap().stock, 5);
        assert!(ledger.get_by_id("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checkout_rolls_back_midway_failure() {
        let (catalog, ledger) = setup().await;
        let tea = catalog
            .create(ItemForm::new("Tea", Money::from_cents(150), 5))
            .await
            .unwrap();

        // Each line fits alone; together they exceed stock, so the second
        // decrement fails after the sale row and first decrement are written.
        let sale = sale(
            "s1",
            now_millis(),
            PaymentMethod::Cash,
            vec![line(&tea, 3), line(&tea, 3)],
        );

        let err = ledger.commit_checkout(&sale).await.unwrap_err();
        assert!(matches!(err, DbError::Rule(CoreError::InsufficientStock { .. })));

        assert_eq!(catalog.require(&tea.id).await.unwrap().stock, 5);
        assert!(ledger.get_by_id("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checkout_duplicate_id_writes_nothing() {
        let (catalog, ledger) = setup().await;
        let tea = catalog
            .create(ItemForm::new("Tea", Money::from_cents(150), 5))
            .await
            .unwrap();
        let sale = sale("s1", now_millis(), PaymentMethod::Cash, vec![line(&tea, 1)]);

        ledger.commit_checkout(&sale).await.unwrap();
        assert!(matches!(
            ledger.commit_checkout(&sale).await,
            Err(DbError::UniqueViolation { .. })
        ));
        assert_eq!(catalog.require(&tea.id).await.unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_sale_snapshot_survives_catalog_changes() {
        let (catalog, ledger) = setup().await;
        let coffee = catalog
            .create(ItemForm::new("Coffee", Money::from_cents(250), 10))
            .await
            .unwrap();
        let sale = sale("s1", now_millis(), PaymentMethod::Cash, vec![line(&coffee, 2)]);
        ledger.commit_checkout(&sale).await.unwrap();

        catalog
            .update(
                &coffee.id,
                ItemPatch::new().name("Latte").price(Money::from_cents(400)).stock(1),
            )
            .await
            .unwrap();

        let stored = ledger.get_by_id("s1").await.unwrap().unwrap();
        assert_eq!(stored.lines, sale.lines);
        assert_eq!(stored.lines[0].name, "Coffee");
        assert_eq!(stored.lines[0].unit_price, Money::from_cents(250));
    }
}
