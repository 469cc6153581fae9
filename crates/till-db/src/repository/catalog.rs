//! # Catalog Repository
//!
//! Item CRUD, stock decrements, filtering and bulk import over the
//! `catalog` collection.
//!
//! ## Stock Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  decrement_stock("p3", 2)                                           │
//! │                                                                     │
//! │  BEGIN                                                              │
//! │    read p3            ── missing?      → NotFound                   │
//! │    2 > p3.stock ?     ── yes           → InsufficientStock          │
//! │    p3.stock -= 2, touch updated_at                                  │
//! │    write p3                                                         │
//! │  COMMIT                                                             │
//! │                                                                     │
//! │  Stock never goes negative, and a failed check writes nothing.      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::record::{Collection, Index};
use crate::store::{LocalStore, StoreTx};
use till_core::types::now_millis;
use till_core::validation::validate_quantity;
use till_core::{filter_items, CoreError, Item, ItemFilter, ItemForm, ItemPatch};

/// Repository for catalog items.
///
/// ## Usage
/// ```rust,ignore
/// let catalog = store.catalog();
///
/// let coffee = catalog.create(ItemForm::new("Coffee", Money::from_cents(250), 10)).await?;
/// let coffee = catalog.decrement_stock(&coffee.id, 2).await?;
/// ```
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    store: LocalStore,
}

impl CatalogRepository {
    pub fn new(store: LocalStore) -> Self {
        CatalogRepository { store }
    }

    /// All items in key order.
    pub async fn list(&self) -> DbResult<Vec<Item>> {
        self.store.get_all().await
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Item>> {
        self.store.get_by_id(id).await
    }

    /// Like [`get_by_id`](Self::get_by_id), failing with `NotFound`.
    pub async fn require(&self, id: &str) -> DbResult<Item> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found(Collection::Catalog.entity(), id))
    }

    /// Creates an item from form input, assigning id and timestamps.
    pub async fn create(&self, form: ItemForm) -> DbResult<Item> {
        let item = Item::create(form, now_millis()).map_err(CoreError::from)?;

        debug!(id = %item.id, name = %item.name, "Creating item");
        self.store.insert(&item).await?;
        Ok(item)
    }

    /// Merges `patch` over the stored item and refreshes `updated_at`.
    pub async fn update(&self, id: &str, patch: ItemPatch) -> DbResult<Item> {
        let mut tx = self.store.begin().await?;

        let mut item: Item = tx
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found(Collection::Catalog.entity(), id))?;

        item.apply(patch, now_millis()).map_err(CoreError::from)?;
        tx.put(&item).await?;
        tx.commit().await?;

        debug!(id = %id, "Item updated");
        Ok(item)
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        if !self.store.delete::<Item>(id).await? {
            return Err(DbError::not_found(Collection::Catalog.entity(), id));
        }
        debug!(id = %id, "Item deleted");
        Ok(())
    }

    /// Takes `quantity` units out of stock.
    pub async fn decrement_stock(&self, id: &str, quantity: i64) -> DbResult<Item> {
        let mut tx = self.store.begin().await?;
        let item = decrement_in(&mut tx, id, quantity, now_millis()).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Applies search, category and sort.
    ///
    /// A category term is answered from the category index.
    pub async fn filter(&self, filter: &ItemFilter) -> DbResult<Vec<Item>> {
        let items = match filter.category {
            Some(ref category) => {
                self.store
                    .find_by_index(Index::CatalogByCategory, category.as_str())
                    .await?
            }
            None => self.list().await?,
        };

        Ok(filter_items(items, filter))
    }

    /// Creates every form in one transaction. All or nothing.
    pub async fn import(&self, forms: Vec<ItemForm>) -> DbResult<Vec<Item>> {
        let now = now_millis();
        let mut tx = self.store.begin().await?;
        let mut created = Vec::with_capacity(forms.len());

        for form in forms {
            let item = Item::create(form, now).map_err(CoreError::from)?;
            tx.insert(&item).await?;
            created.push(item);
        }

        tx.commit().await?;
        info!(count = created.len(), "Catalog import committed");
        Ok(created)
    }

    /// Distinct, non-empty categories in ascending order.
    pub async fn categories(&self) -> DbResult<Vec<String>> {
        let expr = Index::CatalogByCategory.expr();
        let sql = format!(
            "SELECT DISTINCT {expr} FROM catalog WHERE {expr} IS NOT NULL ORDER BY {expr}",
            expr = expr
        );
        let categories: Vec<String> = sqlx::query_scalar(&sql)
            .fetch_all(self.store.pool())
            .await?;
        Ok(categories)
    }
}

/// Stock decrement inside an open transaction.
pub(crate) async fn decrement_in(
    tx: &mut StoreTx,
    id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<Item> {
    validate_quantity(quantity).map_err(CoreError::from)?;

    let mut item: Item = tx
        .get_by_id(id)
        .await?
        .ok_or_else(|| DbError::not_found(Collection::Catalog.entity(), id))?;

    if !item.has_stock(quantity) {
        return Err(CoreError::InsufficientStock {
            item_id: item.id.clone(),
            name: item.name.clone(),
            available: item.stock,
            requested: quantity,
        }
        .into());
    }

    item.stock -= quantity;
    item.touch(now);
    tx.put(&item).await?;

    debug!(id = %id, quantity, remaining = item.stock, "Stock decremented");
    Ok(item)
}
