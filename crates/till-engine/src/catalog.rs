//! # Catalog Cache
//!
//! Lazily fetched products and discounts, dropped after every recorded sale
//! so the next lookup sees post-sale stock.
//!
//! Reads never hold the lock across a fetch: two concurrent misses may both
//! fetch, and the later result wins.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use till_core::discount::{CategorySource, DiscountDefinition};
use till_core::Product;

use crate::error::ServiceResult;
use crate::services::{DiscountCatalog, ProductCatalog};

#[derive(Debug, Default)]
struct Snapshot {
    products: Option<Arc<Vec<Product>>>,
    discounts: Option<Arc<Vec<DiscountDefinition>>>,
}

/// Shared, invalidatable view of the product and discount catalogs.
pub struct CatalogCache {
    products: Arc<dyn ProductCatalog>,
    discounts: Arc<dyn DiscountCatalog>,
    snapshot: RwLock<Snapshot>,
}

impl CatalogCache {
    pub fn new(products: Arc<dyn ProductCatalog>, discounts: Arc<dyn DiscountCatalog>) -> Self {
        CatalogCache {
            products,
            discounts,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// All products, fetched on first use.
    pub async fn products(&self) -> ServiceResult<Arc<Vec<Product>>> {
        if let Some(products) = self.cached_products() {
            return Ok(products);
        }

        let fetched = Arc::new(self.products.fetch_products().await?);
        debug!(count = fetched.len(), "Product catalog fetched");
        self.write().products = Some(fetched.clone());
        Ok(fetched)
    }

    /// Active discounts only, fetched on first use.
    pub async fn active_discounts(&self) -> ServiceResult<Arc<Vec<DiscountDefinition>>> {
        if let Some(discounts) = self.read().discounts.clone() {
            return Ok(discounts);
        }

        let active: Vec<DiscountDefinition> = self
            .discounts
            .fetch_discounts()
            .await?
            .into_iter()
            .filter(DiscountDefinition::is_active)
            .collect();
        debug!(count = active.len(), "Active discounts fetched");

        let active = Arc::new(active);
        self.write().discounts = Some(active.clone());
        Ok(active)
    }

    /// Looks one product up by id.
    pub async fn product(&self, id: &str) -> ServiceResult<Option<Product>> {
        let products = self.products().await?;
        Ok(products.iter().find(|product| product.id == id).cloned())
    }

    /// Products as currently cached, without fetching.
    pub fn cached_products(&self) -> Option<Arc<Vec<Product>>> {
        self.read().products.clone()
    }

    /// Forgets everything; the next read fetches again.
    pub fn invalidate(&self) {
        *self.write() = Snapshot::default();
        info!("Catalog cache invalidated");
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot> {
        self.snapshot.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Category lookup against whatever is cached; never fetches.
impl CategorySource for CatalogCache {
    fn category_of(&self, product_id: &str) -> Option<String> {
        self.cached_products()
            .and_then(|products| products.as_slice().category_of(product_id))
    }
}
