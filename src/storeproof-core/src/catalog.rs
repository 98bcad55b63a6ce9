//! Catalog lookup: resolve a product id to a catalog entry.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A purchasable catalog entry.
///
/// Immutable during a purchase flow; mutated only by administrative
/// editing, which is external to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Catalog identity (the owning content id).
    pub catalog_id: String,
    /// External product id registered with the commerce platforms.
    pub product_id: String,
    /// Price in minor currency units.
    pub price: u64,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Whether the item is currently offered for sale.
    pub purchasable: bool,
}

/// Errors from catalog resolution.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No catalog item carries the product id. Terminal for the claim.
    #[error("no catalog item carries product id '{product_id}'")]
    NotFound {
        /// The product id that failed to resolve.
        product_id: String,
    },

    /// The backing catalog store could not be reached.
    #[error("catalog unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },
}

/// Read-only catalog resolution by product id.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Resolve `product_id` to its catalog entry.
    ///
    /// # Errors
    ///
    /// `NotFound` when no item carries the id; `Unavailable` when the
    /// backing store cannot answer.
    async fn resolve(&self, product_id: &str) -> Result<CatalogItem, CatalogError>;
}

/// In-memory catalog, for tests and the CLI.
#[derive(Default)]
pub struct MemoryCatalog {
    items: RwLock<HashMap<String, CatalogItem>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an item, keyed by product id.
    pub fn insert(&self, item: CatalogItem) {
        if let Ok(mut items) = self.items.write() {
            items.insert(item.product_id.clone(), item);
        }
    }
}

#[async_trait]
impl CatalogLookup for MemoryCatalog {
    async fn resolve(&self, product_id: &str) -> Result<CatalogItem, CatalogError> {
        self.items
            .read()
            .map_err(|_| CatalogError::Unavailable {
                message: "catalog lock poisoned".into(),
            })?
            .get(product_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                product_id: product_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_known_product() {
        let catalog = MemoryCatalog::new();
        catalog.insert(CatalogItem {
            catalog_id: "cat-1".into(),
            product_id: "p-1".into(),
            price: 1000,
            currency: "USD".into(),
            purchasable: true,
        });

        let item = catalog.resolve("p-1").await.unwrap();
        assert_eq!(item.catalog_id, "cat-1");
        assert_eq!(item.price, 1000);

        assert!(matches!(
            catalog.resolve("p-2").await,
            Err(CatalogError::NotFound { .. })
        ));
    }
}
