//! Business logic services

pub mod catalog;
pub mod fines;
pub mod inventory;
pub mod loans;

use std::sync::Arc;

use crate::{clock::Clock, config::LoansConfig, repository::Store};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
}

impl Services {
    /// Create all services over the given store
    pub fn new(store: Arc<dyn Store>, loans_config: LoansConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog: catalog::CatalogService::new(Arc::clone(&store)),
            loans: loans::LoansService::new(store, loans_config, clock),
        }
    }
}
