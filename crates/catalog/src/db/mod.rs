//! Durable storage for the catalog.
//!
//! # Backends
//!
//! - [`memory`] - In-process maps; used when no database is configured and by tests.
//! - [`products`] / [`hearts`] - `PostgreSQL` via sqlx.
//!
//! ## Tables (schema `catalog`)
//!
//! - `products` - Product records; `slug` carries a `UNIQUE` constraint
//! - `user_hearts` - One row per user holding the array of hearted product ids
//!
//! # Migrations
//!
//! Migrations are stored in `crates/catalog/migrations/` and run via:
//! ```bash
//! cargo run -p souk-cli -- migrate
//! ```

pub mod hearts;
pub mod memory;
pub mod products;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use souk_core::{ProductId, Slug, UserId};

use crate::models::Product;

pub use hearts::PgHeartRepository;
pub use memory::{MemoryHeartRepository, MemoryProductRepository};
pub use products::PgProductRepository;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate slug).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The operation did not finish within the storage timeout.
    #[error("storage operation timed out")]
    Timeout,
}

impl RepositoryError {
    /// Whether a read that failed this way is worth one more attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Timeout)
    }
}

/// Storage for product records.
///
/// Implementations must reject a second product with an existing slug with
/// [`RepositoryError::Conflict`]; the store relies on that to make slug
/// assignment safe under concurrent writers.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Insert a new product.
    async fn insert(&self, product: &Product) -> Result<(), RepositoryError>;

    /// Replace an existing product (last writer wins).
    async fn update(&self, product: &Product) -> Result<(), RepositoryError>;

    /// Remove a product by id.
    async fn delete(&self, id: ProductId) -> Result<(), RepositoryError>;

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError>;

    /// Resolve ids in the given order, skipping ids that no longer exist.
    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// All products in creation order.
    async fn list(&self) -> Result<Vec<Product>, RepositoryError>;

    /// Products carrying `tag`, or every tagged product when `tag` is `None`.
    async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Product>, RepositoryError>;

    /// Count products whose slug is `base` or `base-<digits>`, case-insensitively.
    async fn count_slug_family(
        &self,
        base: &Slug,
        exclude: Option<ProductId>,
    ) -> Result<usize, RepositoryError>;
}

/// Storage for users' favorites sets.
#[async_trait]
pub trait HeartRepository: Send + Sync {
    /// The user's hearted product ids, in the order they were added.
    async fn hearts(&self, user: UserId) -> Result<Vec<ProductId>, RepositoryError>;

    /// Atomically remove `product` if present, otherwise add it. Returns the
    /// updated set.
    async fn toggle(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<Vec<ProductId>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique violation to [`RepositoryError::Conflict`].
pub(crate) fn map_unique_violation(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}
