//! # Catalog Service
//!
//! Reads are open to anyone at the register. Writes need an administrator
//! and are queued for the remote store once committed locally.

use tracing::info;

use till_core::{next_timestamp, now_millis, Item, ItemFilter, ItemForm, ItemPatch};
use till_db::CatalogRepository;
use till_sync::{PushJob, Session, SyncCoordinator};

use crate::error::ApiResult;

#[derive(Clone)]
pub struct CatalogService {
    repo: CatalogRepository,
    session: Session,
    coordinator: SyncCoordinator,
}

impl CatalogService {
    pub fn new(repo: CatalogRepository, session: Session, coordinator: SyncCoordinator) -> Self {
        CatalogService {
            repo,
            session,
            coordinator,
        }
    }

    pub async fn list(&self) -> ApiResult<Vec<Item>> {
        Ok(self.repo.list().await?)
    }

    pub async fn get(&self, id: &str) -> ApiResult<Item> {
        Ok(self.repo.require(id).await?)
    }

    pub async fn filter(&self, filter: &ItemFilter) -> ApiResult<Vec<Item>> {
        Ok(self.repo.filter(filter).await?)
    }

    pub async fn categories(&self) -> ApiResult<Vec<String>> {
        Ok(self.repo.categories().await?)
    }

    pub async fn create(&self, form: ItemForm) -> ApiResult<Item> {
        self.session.require_admin("create item")?;

        let item = self.repo.create(form).await?;
        info!(id = %item.id, name = %item.name, "Item created");
        self.coordinator.enqueue(PushJob::UpsertItem(item.clone())).await;
        Ok(item)
    }

    pub async fn update(&self, id: &str, patch: ItemPatch) -> ApiResult<Item> {
        self.session.require_admin("update item")?;

        let item = self.repo.update(id, patch).await?;
        self.coordinator.enqueue(PushJob::UpsertItem(item.clone())).await;
        Ok(item)
    }

    /// Deletes locally and pushes a delete stamped later than the last edit.
    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        self.session.require_admin("delete item")?;

        let item = self.repo.require(id).await?;
        self.repo.delete(id).await?;

        let version = next_timestamp(item.updated_at, now_millis()).timestamp_millis();
        info!(id = %id, "Item deleted");
        self.coordinator
            .enqueue(PushJob::DeleteItem {
                id: id.to_string(),
                version,
            })
            .await;
        Ok(())
    }

    /// Creates every item or none.
    pub async fn import(&self, forms: Vec<ItemForm>) -> ApiResult<Vec<Item>> {
        self.session.require_admin("import items")?;

        let items = self.repo.import(forms).await?;
        for item in &items {
            self.coordinator.enqueue(PushJob::UpsertItem(item.clone())).await;
        }
        Ok(items)
    }
}
