//! Catalog reads and item registration

use std::sync::Arc;

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{Actor, CatalogItem, CreateItem, ItemAvailability},
    repository::Store,
};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Register an item with its copy count (staff only)
    pub async fn register_item(&self, actor: &Actor, item: CreateItem) -> AppResult<CatalogItem> {
        actor.require_staff()?;
        item.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let created = self.store.insert_item(&item).await?;
        tracing::info!(item_id = created.id, total_copies = created.total_copies, "Item registered");
        Ok(created)
    }

    pub async fn get_item(&self, item_id: i32) -> AppResult<CatalogItem> {
        self.store.get_item(item_id).await
    }

    pub async fn availability(&self, item_id: i32) -> AppResult<ItemAvailability> {
        let item = self.store.get_item(item_id).await?;
        item.check_invariant()?;
        Ok(ItemAvailability::from(&item))
    }

    /// Store connectivity, for readiness probes
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }
}
