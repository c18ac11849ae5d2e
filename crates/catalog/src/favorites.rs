//! Users' favorites ("hearts").
//!
//! Hearts are weak references: deleting a product leaves it in other users'
//! sets. Reads skip such dangling ids instead of failing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use souk_core::{ProductId, UserId};

use crate::db::HeartRepository;
use crate::error::CatalogError;
use crate::models::Product;
use crate::store::{ProductStore, read_with_retry, with_timeout};

/// Toggles and resolves favorites sets.
#[derive(Clone)]
pub struct FavoritesManager {
    hearts: Arc<dyn HeartRepository>,
    store: ProductStore,
    timeout: Duration,
}

impl FavoritesManager {
    #[must_use]
    pub fn new(hearts: Arc<dyn HeartRepository>, store: ProductStore, timeout: Duration) -> Self {
        Self {
            hearts,
            store,
            timeout,
        }
    }

    /// Heart `product` if it is not in the user's set, otherwise un-heart it.
    /// Returns the updated set.
    ///
    /// Only existing products can be hearted; removing an id is always allowed
    /// so users can clear hearts on deleted products.
    ///
    /// # Errors
    ///
    /// `NotFound` when hearting an unknown product, `Storage` on repository
    /// failure.
    #[instrument(skip(self))]
    pub async fn toggle_heart(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<Vec<ProductId>, CatalogError> {
        let current = read_with_retry(self.timeout, || self.hearts.hearts(user)).await?;
        if !current.contains(&product) {
            self.store.get_by_id(product).await?;
        }

        let hearts = with_timeout(self.timeout, self.hearts.toggle(user, product)).await?;
        info!(
            hearted = hearts.contains(&product),
            count = hearts.len(),
            "Toggled heart"
        );
        Ok(hearts)
    }

    /// The user's hearted products, in the order they were hearted.
    ///
    /// # Errors
    ///
    /// `Storage` on repository failure.
    #[instrument(skip(self))]
    pub async fn get_hearted(&self, user: UserId) -> Result<Vec<Product>, CatalogError> {
        let ids = read_with_retry(self.timeout, || self.hearts.hearts(user)).await?;
        let products = self.store.get_many(&ids).await?;

        if products.len() < ids.len() {
            let dangling: Vec<_> = ids
                .iter()
                .filter(|id| !products.iter().any(|p| p.id == **id))
                .map(ToString::to_string)
                .collect();
            warn!(?dangling, "Skipping hearts on deleted products");
        }
        Ok(products)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::{MemoryHeartRepository, MemoryProductRepository};
    use crate::models::{LocationFields, NewProduct, ProductFields};
    use crate::search::CatalogIndexes;

    fn setup() -> (ProductStore, FavoritesManager) {
        let timeout = Duration::from_secs(5);
        let store = ProductStore::new(
            Arc::new(MemoryProductRepository::new()),
            CatalogIndexes::new().unwrap(),
            timeout,
        );
        let favorites =
            FavoritesManager::new(Arc::new(MemoryHeartRepository::new()), store.clone(), timeout);
        (store, favorites)
    }

    async fn create(store: &ProductStore, name: &str, seller: UserId) -> Product {
        let input = NewProduct::try_from(ProductFields {
            name: Some(name.to_owned()),
            price: Some("3".to_owned()),
            location: LocationFields {
                address: Some("Stall 4".to_owned()),
                lng: Some("-0.1".to_owned()),
                lat: Some("51.5".to_owned()),
                ..LocationFields::default()
            },
            ..ProductFields::default()
        })
        .unwrap();
        store.create(input, seller).await.unwrap()
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_original_set() {
        let (store, favorites) = setup();
        let user = UserId::generate();
        let lamp = create(&store, "Lamp", UserId::generate()).await;
        let rug = create(&store, "Rug", UserId::generate()).await;

        assert_eq!(favorites.toggle_heart(user, rug.id).await.unwrap(), vec![rug.id]);
        let hearts = favorites.toggle_heart(user, lamp.id).await.unwrap();
        assert_eq!(hearts, vec![rug.id, lamp.id]);

        let hearts = favorites.toggle_heart(user, lamp.id).await.unwrap();
        assert_eq!(hearts, vec![rug.id]);
    }

    #[tokio::test]
    async fn test_concurrent_toggles_never_duplicate() {
        let (store, favorites) = setup();
        let user = UserId::generate();
        let lamp = create(&store, "Lamp", UserId::generate()).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let favorites = favorites.clone();
                tokio::spawn(async move { favorites.toggle_heart(user, lamp.id).await })
            })
            .collect();
        for handle in handles {
            let hearts = handle.await.unwrap().unwrap();
            assert!(hearts.iter().filter(|id| **id == lamp.id).count() <= 1);
        }
        // an even number of toggles lands back on the empty set
        assert!(favorites.get_hearted(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cannot_heart_unknown_product() {
        let (_, favorites) = setup();
        let err = favorites
            .toggle_heart(UserId::generate(), ProductId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_hearted_skips_deleted_products() {
        let (store, favorites) = setup();
        let user = UserId::generate();
        let seller = UserId::generate();
        let lamp = create(&store, "Lamp", seller).await;
        let rug = create(&store, "Rug", seller).await;
        favorites.toggle_heart(user, lamp.id).await.unwrap();
        favorites.toggle_heart(user, rug.id).await.unwrap();

        store.delete(lamp.id, seller).await.unwrap();

        let hearted = favorites.get_hearted(user).await.unwrap();
        assert_eq!(hearted.iter().map(|p| p.id).collect::<Vec<_>>(), vec![rug.id]);

        // the dangling id can still be removed
        let hearts = favorites.toggle_heart(user, lamp.id).await.unwrap();
        assert_eq!(hearts, vec![rug.id]);
    }
}
