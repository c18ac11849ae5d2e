//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::config::CatalogConfig;
use crate::db::{
    HeartRepository, MemoryHeartRepository, MemoryProductRepository, PgHeartRepository,
    PgProductRepository, ProductRepository,
};
use crate::error::CatalogError;
use crate::favorites::FavoritesManager;
use crate::images::{BlobStore, ImagePipeline, LocalBlobStore};
use crate::search::{CatalogIndexes, SearchEngine};
use crate::store::ProductStore;
use crate::tags::TagAggregator;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Every storage client is built
/// once at startup and handed to the components that need it.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: CatalogConfig,
    pool: Option<PgPool>,
    store: ProductStore,
    search: SearchEngine,
    images: ImagePipeline,
    tags: TagAggregator,
    favorites: FavoritesManager,
}

impl AppState {
    /// Create the application state from configuration.
    ///
    /// With a pool the repositories are `PostgreSQL`-backed, otherwise
    /// in-memory. Photos go to the configured uploads directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the search indexes cannot be built.
    pub async fn new(config: CatalogConfig, pool: Option<PgPool>) -> Result<Self, CatalogError> {
        let (products, hearts): (Arc<dyn ProductRepository>, Arc<dyn HeartRepository>) =
            match &pool {
                Some(pool) => (
                    Arc::new(PgProductRepository::new(pool.clone())),
                    Arc::new(PgHeartRepository::new(pool.clone())),
                ),
                None => {
                    info!("No database configured, using in-memory storage");
                    (
                        Arc::new(MemoryProductRepository::new()),
                        Arc::new(MemoryHeartRepository::new()),
                    )
                }
            };
        let blobs = Arc::new(LocalBlobStore::new(config.uploads_dir.clone()));

        Self::from_parts(config, pool, products, hearts, blobs).await
    }

    /// Create the application state from explicit storage clients, then load
    /// the search indexes from the product repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the search indexes cannot be built.
    pub async fn from_parts(
        config: CatalogConfig,
        pool: Option<PgPool>,
        products: Arc<dyn ProductRepository>,
        hearts: Arc<dyn HeartRepository>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self, CatalogError> {
        let store = ProductStore::new(products, CatalogIndexes::new()?, config.storage_timeout);
        store.rebuild_indexes().await?;

        let images = ImagePipeline::new(blobs, config.image_width, config.image_timeout);
        let favorites = FavoritesManager::new(hearts, store.clone(), config.storage_timeout);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                search: SearchEngine::new(store.clone()),
                tags: TagAggregator::new(store.clone()),
                config,
                pool,
                store,
                images,
                favorites,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &CatalogConfig {
        &self.inner.config
    }

    /// The database pool, when running against `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> &ProductStore {
        &self.inner.store
    }

    #[must_use]
    pub fn search(&self) -> &SearchEngine {
        &self.inner.search
    }

    #[must_use]
    pub fn images(&self) -> &ImagePipeline {
        &self.inner.images
    }

    #[must_use]
    pub fn tags(&self) -> &TagAggregator {
        &self.inner.tags
    }

    #[must_use]
    pub fn favorites(&self) -> &FavoritesManager {
        &self.inner.favorites
    }
}
