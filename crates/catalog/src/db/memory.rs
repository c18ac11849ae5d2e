//! In-memory repositories.
//!
//! Used when no database URL is configured, and by tests. Each operation
//! holds the lock for its whole read-check-write sequence, so slug
//! uniqueness and heart toggles are atomic here just as they are in
//! `PostgreSQL`.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use regex::RegexBuilder;

use souk_core::{ProductId, Slug, UserId, slug_family_pattern};

use super::{HeartRepository, ProductRepository, RepositoryError};
use crate::models::Product;

fn poisoned() -> RepositoryError {
    RepositoryError::DataCorruption("lock poisoned".to_owned())
}

/// Product records kept in creation order.
#[derive(Debug, Default)]
pub struct MemoryProductRepository {
    products: RwLock<Vec<Product>>,
}

impl MemoryProductRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductRepository for MemoryProductRepository {
    async fn insert(&self, product: &Product) -> Result<(), RepositoryError> {
        let mut products = self.products.write().map_err(|_| poisoned())?;
        if products.iter().any(|p| p.id == product.id) {
            return Err(RepositoryError::Conflict("product id already exists".to_owned()));
        }
        if products.iter().any(|p| p.slug == product.slug) {
            return Err(RepositoryError::Conflict("slug already exists".to_owned()));
        }
        products.push(product.clone());
        Ok(())
    }

    async fn update(&self, product: &Product) -> Result<(), RepositoryError> {
        let mut products = self.products.write().map_err(|_| poisoned())?;
        if products
            .iter()
            .any(|p| p.id != product.id && p.slug == product.slug)
        {
            return Err(RepositoryError::Conflict("slug already exists".to_owned()));
        }
        let existing = products
            .iter_mut()
            .find(|p| p.id == product.id)
            .ok_or(RepositoryError::NotFound)?;
        *existing = product.clone();
        Ok(())
    }

    async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let mut products = self.products.write().map_err(|_| poisoned())?;
        let before = products.len();
        products.retain(|p| p.id != id);
        if products.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().map_err(|_| poisoned())?;
        Ok(products.iter().find(|p| p.id == id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().map_err(|_| poisoned())?;
        Ok(products.iter().find(|p| p.slug.as_str() == slug).cloned())
    }

    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().map_err(|_| poisoned())?;
        Ok(ids
            .iter()
            .filter_map(|id| products.iter().find(|p| p.id == *id).cloned())
            .collect())
    }

    async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().map_err(|_| poisoned())?;
        Ok(products.clone())
    }

    async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().map_err(|_| poisoned())?;
        Ok(products
            .iter()
            .filter(|p| match tag {
                Some(tag) => p.tags.iter().any(|t| t == tag),
                None => !p.tags.is_empty(),
            })
            .cloned()
            .collect())
    }

    async fn count_slug_family(
        &self,
        base: &Slug,
        exclude: Option<ProductId>,
    ) -> Result<usize, RepositoryError> {
        let pattern = RegexBuilder::new(&slug_family_pattern(base))
            .case_insensitive(true)
            .build()
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid slug pattern: {e}")))?;

        let products = self.products.read().map_err(|_| poisoned())?;
        Ok(products
            .iter()
            .filter(|p| Some(p.id) != exclude && pattern.is_match(p.slug.as_str()))
            .count())
    }
}

/// Favorites sets keyed by user.
#[derive(Debug, Default)]
pub struct MemoryHeartRepository {
    hearts: Mutex<HashMap<UserId, Vec<ProductId>>>,
}

impl MemoryHeartRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HeartRepository for MemoryHeartRepository {
    async fn hearts(&self, user: UserId) -> Result<Vec<ProductId>, RepositoryError> {
        let hearts = self.hearts.lock().map_err(|_| poisoned())?;
        Ok(hearts.get(&user).cloned().unwrap_or_default())
    }

    async fn toggle(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<Vec<ProductId>, RepositoryError> {
        let mut hearts = self.hearts.lock().map_err(|_| poisoned())?;
        let set = hearts.entry(user).or_default();
        if set.contains(&product) {
            set.retain(|id| *id != product);
        } else {
            set.push(product);
        }
        Ok(set.clone())
    }
}
