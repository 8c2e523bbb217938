use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{config::MAX_FEATURED_PRODUCTS, errors::ServiceError, models::Product};

/// Read-only product catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, ServiceError>;

    /// Products for the home page, never more than four.
    async fn list_featured(&self) -> Result<Vec<Product>, ServiceError>;

    async fn get_product(&self, id: &str) -> Result<Product, ServiceError>;
}

/// Catalog held in memory, in the order it was loaded.
#[derive(Debug, Clone)]
pub struct InMemoryCatalog {
    products: Vec<Product>,
    featured_limit: usize,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products,
            featured_limit: MAX_FEATURED_PRODUCTS,
        }
    }

    pub fn with_featured_limit(mut self, limit: usize) -> Self {
        self.featured_limit = limit.min(MAX_FEATURED_PRODUCTS);
        self
    }

    /// Loads a JSON array of products.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let products: Vec<Product> = serde_json::from_str(&raw)?;
        debug!(count = products.len(), path = %path.as_ref().display(), "Catalog loaded");
        Ok(Self::new(products))
    }

    pub fn by_category(&self, category: &str) -> Vec<Product> {
        self.products
            .iter()
            .filter(|p| p.category.eq_ignore_ascii_case(category))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn list_products(&self) -> Result<Vec<Product>, ServiceError> {
        Ok(self.products.clone())
    }

    async fn list_featured(&self) -> Result<Vec<Product>, ServiceError> {
        Ok(self
            .products
            .iter()
            .take(self.featured_limit)
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_product(&self, id: &str) -> Result<Product, ServiceError> {
        self.products
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }
}
