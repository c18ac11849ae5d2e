//! The product store: records, slugs, ownership, and secondary indexes.
//!
//! Every write runs the same visible pipeline:
//!
//! 1. validate (callers hand in an already-parsed [`NewProduct`] or [`ProductPatch`])
//! 2. assign a slug, if the product is new or its name changed
//! 3. persist through the [`ProductRepository`]
//! 4. update the text and geo indexes
//!
//! Index maintenance is serialized and re-reads the record after the write,
//! so a slow write cannot put back a product that a later delete removed.
//!
//! Repository calls are bounded by the storage timeout. Reads that fail
//! transiently are retried once; writes are not retried except to pick a new
//! slug after a uniqueness conflict.

mod slug;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use souk_core::{ProductId, Slug, UserId};

use crate::db::{ProductRepository, RepositoryError};
use crate::error::CatalogError;
use crate::models::{NewProduct, Product, ProductPatch};
use crate::search::CatalogIndexes;

pub use slug::{MAX_SLUG_ATTEMPTS, next_slug};

#[derive(Debug, Clone, Copy)]
enum SaveMode {
    Insert,
    Update,
}

/// Owns product records and keeps the search indexes consistent with them.
#[derive(Clone)]
pub struct ProductStore {
    repo: Arc<dyn ProductRepository>,
    indexes: CatalogIndexes,
    index_lock: Arc<Mutex<()>>,
    timeout: Duration,
}

impl ProductStore {
    #[must_use]
    pub fn new(repo: Arc<dyn ProductRepository>, indexes: CatalogIndexes, timeout: Duration) -> Self {
        Self {
            repo,
            indexes,
            index_lock: Arc::new(Mutex::new(())),
            timeout,
        }
    }

    /// The secondary indexes maintained by this store.
    #[must_use]
    pub const fn indexes(&self) -> &CatalogIndexes {
        &self.indexes
    }

    /// Create a product owned by `seller`.
    ///
    /// # Errors
    ///
    /// - `Conflict` if no unique slug could be assigned
    /// - `Storage` on repository or index failure
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: NewProduct, seller: UserId) -> Result<Product, CatalogError> {
        let product = Product {
            id: ProductId::generate(),
            slug: Slug::from_name(&input.name),
            name: input.name,
            description: input.description,
            price: input.price,
            tags: input.tags,
            created: Utc::now(),
            location: input.location,
            photo: input.photo,
            seller,
        };
        let product = self.save_with_unique_slug(product, SaveMode::Insert).await?;
        info!(id = %product.id, slug = %product.slug, "Created product");
        Ok(product)
    }

    /// # Errors
    ///
    /// `NotFound` if no product has this id.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.read(|| self.repo.get(id))
            .await?
            .ok_or_else(CatalogError::product_not_found)
    }

    /// # Errors
    ///
    /// `NotFound` if no product has this slug.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Product, CatalogError> {
        self.read(|| self.repo.get_by_slug(slug))
            .await?
            .ok_or_else(CatalogError::product_not_found)
    }

    /// All products in creation order.
    ///
    /// # Errors
    ///
    /// `Storage` on repository failure.
    pub async fn list(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.read(|| self.repo.list()).await?)
    }

    /// Products carrying `tag`, or every tagged product when `tag` is `None`.
    ///
    /// # Errors
    ///
    /// `Storage` on repository failure.
    pub async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Product>, CatalogError> {
        Ok(self.read(|| self.repo.list_by_tag(tag)).await?)
    }

    /// Resolve ids in order, skipping any that no longer exist.
    ///
    /// # Errors
    ///
    /// `Storage` on repository failure.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, CatalogError> {
        Ok(self.read(|| self.repo.get_many(ids)).await?)
    }

    /// Load a product and check that `requester` is its seller.
    ///
    /// # Errors
    ///
    /// `NotFound` if the product does not exist, `Forbidden` if `requester`
    /// is not the seller.
    pub async fn ensure_can_modify(
        &self,
        id: ProductId,
        requester: UserId,
    ) -> Result<Product, CatalogError> {
        let product = self.get_by_id(id).await?;
        if product.seller != requester {
            warn!(%id, %requester, "Rejected change by non-owner");
            return Err(CatalogError::Forbidden(
                "You must own a product in order to edit it!".to_owned(),
            ));
        }
        Ok(product)
    }

    /// Apply `patch` to a product owned by `requester`.
    ///
    /// The slug is regenerated only when the name actually changes.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden`, `Conflict`, or `Storage`.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: ProductId,
        patch: ProductPatch,
        requester: UserId,
    ) -> Result<Product, CatalogError> {
        let mut product = self.ensure_can_modify(id, requester).await?;

        let product = if patch.apply(&mut product) {
            product.slug = Slug::from_name(&product.name);
            self.save_with_unique_slug(product, SaveMode::Update).await?
        } else {
            self.bounded(self.repo.update(&product)).await?;
            self.sync_index(product.id).await?;
            product
        };

        info!(id = %product.id, slug = %product.slug, "Updated product");
        Ok(product)
    }

    /// Delete a product owned by `requester`.
    ///
    /// Other users' hearts referencing the product are left in place.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden`, or `Storage`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ProductId, requester: UserId) -> Result<(), CatalogError> {
        self.ensure_can_modify(id, requester).await?;
        self.bounded(self.repo.delete(id)).await?;
        self.sync_index(id).await?;
        info!(%id, "Deleted product");
        Ok(())
    }

    /// Repopulate both indexes from the repository.
    ///
    /// # Errors
    ///
    /// `Storage` if the repository cannot be read or an index rebuilt.
    #[instrument(skip(self))]
    pub async fn rebuild_indexes(&self) -> Result<usize, CatalogError> {
        let _guard = self.index_lock.lock().await;
        let products = self.list().await?;
        let count = products.len();
        self.indexes.replace_all(products).await?;
        info!(count, "Rebuilt search indexes");
        Ok(count)
    }

    /// Persist `product` under the first free slug of its family.
    ///
    /// `product.slug` holds the base slug on entry.
    async fn save_with_unique_slug(
        &self,
        mut product: Product,
        mode: SaveMode,
    ) -> Result<Product, CatalogError> {
        let base = product.slug.clone();
        let exclude = matches!(mode, SaveMode::Update).then_some(product.id);
        let taken = self
            .read(|| self.repo.count_slug_family(&base, exclude))
            .await?;

        for attempt in 0..MAX_SLUG_ATTEMPTS {
            product.slug = next_slug(&base, taken, attempt);
            let result = match mode {
                SaveMode::Insert => self.bounded(self.repo.insert(&product)).await,
                SaveMode::Update => self.bounded(self.repo.update(&product)).await,
            };
            match result {
                Ok(()) => {
                    self.sync_index(product.id).await?;
                    return Ok(product);
                }
                Err(RepositoryError::Conflict(reason)) => {
                    debug!(slug = %product.slug, attempt, %reason, "Slug taken, trying next suffix");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(%base, "Gave up assigning a unique slug");
        Err(CatalogError::Conflict(format!(
            "could not assign a unique slug for {:?}, try again",
            product.name
        )))
    }

    /// Bring the index entries for `id` in line with the repository.
    ///
    /// Runs after the repository write. The record is read under the index
    /// lock, so the last writer to get here indexes the latest state.
    async fn sync_index(&self, id: ProductId) -> Result<(), CatalogError> {
        let _guard = self.index_lock.lock().await;
        let current = self.read(|| self.repo.get(id)).await?;
        let result = match &current {
            Some(product) => self.indexes.upsert(product).await,
            None => self.indexes.remove(id).await,
        };
        result.map_err(|e| {
            error!(%id, error = %e, "Failed to update search indexes");
            CatalogError::from(e)
        })
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, RepositoryError> {
        with_timeout(self.timeout, op).await
    }

    async fn read<T, F, Fut>(&self, op: F) -> Result<T, RepositoryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        read_with_retry(self.timeout, op).await
    }
}

/// Run a repository call under `timeout`.
pub(crate) async fn with_timeout<T>(
    timeout: Duration,
    op: impl Future<Output = Result<T, RepositoryError>>,
) -> Result<T, RepositoryError> {
    tokio::time::timeout(timeout, op)
        .await
        .map_err(|_| RepositoryError::Timeout)?
}

/// Run an idempotent read under `timeout`, retrying once on a transient failure.
pub(crate) async fn read_with_retry<T, F, Fut>(timeout: Duration, op: F) -> Result<T, RepositoryError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    match with_timeout(timeout, op()).await {
        Err(e) if e.is_transient() => {
            warn!(error = %e, "Storage read failed, retrying once");
            with_timeout(timeout, op()).await
        }
        result => result,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::db::MemoryProductRepository;
    use crate::models::{LocationFields, ProductFields};

    fn input(name: &str) -> NewProduct {
        NewProduct::try_from(ProductFields {
            name: Some(name.to_owned()),
            description: Some("A fine thing".to_owned()),
            price: Some("10".to_owned()),
            tags: Some(vec!["home".to_owned()]),
            location: LocationFields {
                kind: Some("Polygon".to_owned()),
                address: Some("1 High St".to_owned()),
                lng: Some("-0.1".to_owned()),
                lat: Some("51.5".to_owned()),
            },
        })
        .unwrap()
    }

    fn store_with(repo: Arc<dyn ProductRepository>) -> ProductStore {
        ProductStore::new(repo, CatalogIndexes::new().unwrap(), Duration::from_secs(5))
    }

    fn store() -> ProductStore {
        store_with(Arc::new(MemoryProductRepository::new()))
    }

    fn rename(name: &str) -> ProductPatch {
        ProductPatch {
            name: Some(name.to_owned()),
            ..ProductPatch::default()
        }
    }

    /// Memory repository that fails a scripted number of inserts and reads.
    #[derive(Default)]
    struct ScriptedRepository {
        inner: MemoryProductRepository,
        insert_conflicts: AtomicUsize,
        get_failures: AtomicUsize,
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl ProductRepository for ScriptedRepository {
        async fn insert(&self, product: &Product) -> Result<(), RepositoryError> {
            if take(&self.insert_conflicts) {
                return Err(RepositoryError::Conflict("slug already exists".to_owned()));
            }
            self.inner.insert(product).await
        }
        async fn update(&self, product: &Product) -> Result<(), RepositoryError> {
            self.inner.update(product).await
        }
        async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
            self.inner.delete(id).await
        }
        async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
            if take(&self.get_failures) {
                return Err(RepositoryError::Timeout);
            }
            self.inner.get(id).await
        }
        async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
            self.inner.get_by_slug(slug).await
        }
        async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
            self.inner.get_many(ids).await
        }
        async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
            self.inner.list().await
        }
        async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Product>, RepositoryError> {
            self.inner.list_by_tag(tag).await
        }
        async fn count_slug_family(
            &self,
            base: &Slug,
            exclude: Option<ProductId>,
        ) -> Result<usize, RepositoryError> {
            self.inner.count_slug_family(base, exclude).await
        }
    }

    #[tokio::test]
    async fn test_sequential_duplicate_names_get_numbered_slugs() {
        let store = store();
        let seller = UserId::generate();
        let mut slugs = Vec::new();
        for _ in 0..3 {
            let product = store.create(input("Test Product"), seller).await.unwrap();
            slugs.push(product.slug.into_inner());
        }
        assert_eq!(slugs, ["test-product", "test-product-2", "test-product-3"]);
    }

    #[tokio::test]
    async fn test_create_stores_seller_and_point_location() {
        let store = store();
        let seller = UserId::generate();
        let product = store.create(input("Lamp"), seller).await.unwrap();

        assert_eq!(product.seller, seller);
        let json = serde_json::to_value(&product.location).unwrap();
        assert_eq!(json["type"], "Point");

        assert_eq!(store.get_by_slug("lamp").await.unwrap().id, product.id);
        assert_eq!(store.get_by_id(product.id).await.unwrap(), product);
        assert_eq!(store.indexes().geo.len(), 1);
    }

    #[tokio::test]
    async fn test_gap_in_slug_family_resolves_to_next_free_suffix() {
        let store = store();
        let seller = UserId::generate();
        store.create(input("x"), seller).await.unwrap();
        store.create(input("x"), seller).await.unwrap(); // x-2
        store.create(input("x"), seller).await.unwrap(); // x-3
        let second = store.get_by_slug("x-2").await.unwrap();
        store.delete(second.id, seller).await.unwrap();

        // family is {x, x-3}: first candidate x-3 collides, retry takes x-4
        let product = store.create(input("x"), seller).await.unwrap();
        assert_eq!(product.slug.as_str(), "x-4");
    }

    #[tokio::test]
    async fn test_exhausted_slug_retries_is_conflict() {
        let repo = Arc::new(ScriptedRepository::default());
        repo.insert_conflicts.store(MAX_SLUG_ATTEMPTS, Ordering::SeqCst);
        let store = store_with(repo.clone());

        let err = store
            .create(input("Lamp"), UserId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.indexes().text.num_docs(), 0);
    }

    #[tokio::test]
    async fn test_transient_read_is_retried_once() {
        let repo = Arc::new(ScriptedRepository::default());
        let store = store_with(repo.clone());
        let product = store.create(input("Lamp"), UserId::generate()).await.unwrap();

        repo.get_failures.store(1, Ordering::SeqCst);
        assert_eq!(store.get_by_id(product.id).await.unwrap().id, product.id);

        repo.get_failures.store(2, Ordering::SeqCst);
        assert!(matches!(
            store.get_by_id(product.id).await,
            Err(CatalogError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_non_owner_cannot_update_or_delete() {
        let store = store();
        let seller = UserId::generate();
        let stranger = UserId::generate();
        let product = store.create(input("Lamp"), seller).await.unwrap();

        let err = store
            .update(product.id, rename("Stolen lamp"), stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));

        let err = store.delete(product.id, stranger).await.unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));

        assert_eq!(store.get_by_id(product.id).await.unwrap().name, "Lamp");
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let store = store();
        let id = ProductId::generate();
        let user = UserId::generate();
        assert!(matches!(
            store.update(id, rename("x"), user).await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(id, user).await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            store.get_by_slug("nope").await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_slug_regenerated_only_on_rename() {
        let store = store();
        let seller = UserId::generate();
        let product = store.create(input("Brass Lamp"), seller).await.unwrap();

        let patch = ProductPatch {
            price: Some(souk_core::Price::parse("99").unwrap()),
            ..ProductPatch::default()
        };
        let updated = store.update(product.id, patch, seller).await.unwrap();
        assert_eq!(updated.slug.as_str(), "brass-lamp");

        // same name: no slug scan, slug unchanged
        let updated = store
            .update(product.id, rename("Brass Lamp"), seller)
            .await
            .unwrap();
        assert_eq!(updated.slug.as_str(), "brass-lamp");

        // the product's own slug does not count against it
        let updated = store
            .update(product.id, rename("brass lamp"), seller)
            .await
            .unwrap();
        assert_eq!(updated.slug.as_str(), "brass-lamp");

        let updated = store
            .update(product.id, rename("Copper Kettle"), seller)
            .await
            .unwrap();
        assert_eq!(updated.slug.as_str(), "copper-kettle");
        assert_eq!(updated.created, product.created);
        assert!(store.get_by_slug("brass-lamp").await.is_err());
    }

    #[tokio::test]
    async fn test_update_reindexes_text() {
        let store = store();
        let seller = UserId::generate();
        let product = store.create(input("Brass Lamp"), seller).await.unwrap();
        store
            .update(product.id, rename("Copper Kettle"), seller)
            .await
            .unwrap();

        assert!(store.indexes().text.search("brass", 10).unwrap().is_empty());
        assert_eq!(store.indexes().text.search("kettle", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_index_entries() {
        let store = store();
        let seller = UserId::generate();
        let product = store.create(input("Lamp"), seller).await.unwrap();
        store.delete(product.id, seller).await.unwrap();

        assert!(store.list().await.unwrap().is_empty());
        assert!(store.indexes().geo.is_empty());
        assert_eq!(store.indexes().text.num_docs(), 0);
    }

    /// Memory repository whose updates commit, then wait for a release.
    #[derive(Default)]
    struct GatedRepository {
        inner: MemoryProductRepository,
        committed: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl ProductRepository for GatedRepository {
        async fn insert(&self, product: &Product) -> Result<(), RepositoryError> {
            self.inner.insert(product).await
        }
        async fn update(&self, product: &Product) -> Result<(), RepositoryError> {
            self.inner.update(product).await?;
            self.committed.notify_one();
            self.release.notified().await;
            Ok(())
        }
        async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
            self.inner.delete(id).await
        }
        async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
            self.inner.get(id).await
        }
        async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
            self.inner.get_by_slug(slug).await
        }
        async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
            self.inner.get_many(ids).await
        }
        async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
            self.inner.list().await
        }
        async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Product>, RepositoryError> {
            self.inner.list_by_tag(tag).await
        }
        async fn count_slug_family(
            &self,
            base: &Slug,
            exclude: Option<ProductId>,
        ) -> Result<usize, RepositoryError> {
            self.inner.count_slug_family(base, exclude).await
        }
    }

    #[tokio::test]
    async fn test_slow_update_does_not_restore_deleted_product() {
        let repo = Arc::new(GatedRepository::default());
        let store = store_with(repo.clone());
        let seller = UserId::generate();
        let product = store.create(input("Brass Lamp"), seller).await.unwrap();

        let updating = tokio::spawn({
            let store = store.clone();
            async move {
                let patch = ProductPatch {
                    price: Some(souk_core::Price::parse("99").unwrap()),
                    ..ProductPatch::default()
                };
                store.update(product.id, patch, seller).await
            }
        });

        repo.committed.notified().await;
        store.delete(product.id, seller).await.unwrap();
        repo.release.notify_one();
        updating.await.unwrap().unwrap();

        assert!(store.list().await.unwrap().is_empty());
        assert!(store.indexes().geo.is_empty());
        assert_eq!(store.indexes().text.num_docs(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_updates_leave_latest_in_index() {
        let store = store();
        let seller = UserId::generate();
        let product = store.create(input("Brass Lamp"), seller).await.unwrap();

        let renames: Vec<_> = ["Copper Kettle", "Iron Skillet", "Tin Cup"]
            .into_iter()
            .map(|name| {
                let store = store.clone();
                tokio::spawn(async move { store.update(product.id, rename(name), seller).await })
            })
            .collect();
        for handle in renames {
            handle.await.unwrap().unwrap();
        }

        let latest = store.get_by_id(product.id).await.unwrap();
        let first_word = latest.name.split(' ').next().unwrap().to_lowercase();
        assert_eq!(store.indexes().text.num_docs(), 1);
        assert_eq!(store.indexes().text.search(&first_word, 10).unwrap().len(), 1);
        assert_eq!(store.indexes().geo.len(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_indexes_from_repository() {
        let repo = Arc::new(MemoryProductRepository::new());
        let seller = UserId::generate();
        store_with(repo.clone())
            .create(input("Lamp"), seller)
            .await
            .unwrap();

        let fresh = store_with(repo);
        assert_eq!(fresh.indexes().text.num_docs(), 0);
        assert_eq!(fresh.rebuild_indexes().await.unwrap(), 1);
        assert_eq!(fresh.indexes().text.search("lamp", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_tag() {
        let store = store();
        let seller = UserId::generate();
        store.create(input("Lamp"), seller).await.unwrap();
        assert_eq!(store.list_by_tag(Some("home")).await.unwrap().len(), 1);
        assert!(store.list_by_tag(Some("garden")).await.unwrap().is_empty());
        assert_eq!(store.list_by_tag(None).await.unwrap().len(), 1);
    }
}
