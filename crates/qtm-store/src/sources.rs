//! Store-backed suite and catalog sources.
//!
//! Read the `suites` and `catalog` tables seeded with
//! [`Store::put_suite`] / [`Store::put_catalog_item`]. These stand in
//! for the networked KV sources, which stay out of scope.

use async_trait::async_trait;

use qtm_core::catalog::{CatalogError, CatalogItem, CatalogSource};
use qtm_core::suite::{Suite, SuiteError, SuiteSource};

use crate::store::Store;

/// Suite source reading `suites/{name}` from the store.
pub struct StoreSuiteSource {
    store: Store,
    suite: String,
}

impl StoreSuiteSource {
    pub fn new(store: Store, suite: &str) -> Self {
        Self {
            store,
            suite: suite.to_string(),
        }
    }
}

#[async_trait]
impl SuiteSource for StoreSuiteSource {
    async fn fetch_suite(&self) -> Result<Suite, SuiteError> {
        let items = self
            .store
            .get_suite(&self.suite)
            .map_err(|e| SuiteError::Store(e.to_string()))?
            .ok_or_else(|| SuiteError::NotFound(self.suite.clone()))?;
        Ok(Suite {
            name: self.suite.clone(),
            items,
        })
    }
}

/// Catalog source reading `catalog/{group}/{name}` from the store.
pub struct StoreCatalogSource {
    store: Store,
}

impl StoreCatalogSource {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CatalogSource for StoreCatalogSource {
    async fn fetch(&self, name: &str, group: &str) -> Result<CatalogItem, CatalogError> {
        self.store
            .get_catalog_item(group, name)
            .map_err(|e| CatalogError::Store(e.to_string()))?
            .ok_or_else(|| CatalogError::ItemNotFound {
                name: name.to_string(),
                group: group.to_string(),
            })
    }
}
