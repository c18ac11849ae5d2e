//! Relevance and proximity search over the catalog.
//!
//! Two secondary indexes back the queries:
//! - [`TextIndex`] - Tantivy BM25 index over product name and description
//! - [`GeoIndex`] - product coordinates, scanned by great-circle distance
//!
//! Both are owned by the [`ProductStore`](crate::store::ProductStore), which
//! updates them on every write and rebuilds them from the repository at
//! startup. Queries resolve index hits back to full records through the store.

mod geo;
mod text;

use std::sync::Arc;

use tracing::{debug, instrument};

use souk_core::{GeoPoint, ProductId};

use crate::error::CatalogError;
use crate::models::{NearbyProduct, Product, parse_point};
use crate::store::ProductStore;

pub use geo::GeoIndex;
pub use text::TextIndex;

/// Default number of results for proximity search.
pub const DEFAULT_NEAR_LIMIT: usize = 10;

/// Upper bound on the number of results for proximity search.
pub const MAX_NEAR_LIMIT: usize = 100;

/// Errors from the search indexes.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search index error: {0}")]
    Index(String),

    #[error("search query error: {0}")]
    Query(String),
}

/// The secondary indexes kept in step with the product repository.
#[derive(Clone)]
pub struct CatalogIndexes {
    pub text: TextIndex,
    pub geo: GeoIndex,
}

impl CatalogIndexes {
    /// Create empty indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the text index cannot be created.
    pub fn new() -> Result<Self, SearchError> {
        Ok(Self {
            text: TextIndex::new()?,
            geo: GeoIndex::new(),
        })
    }

    /// Index a created or updated product.
    ///
    /// The text commit runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns an error if either index rejects the write.
    pub async fn upsert(&self, product: &Product) -> Result<(), SearchError> {
        let text = self.text.clone();
        let doc = product.clone();
        blocking(move || text.upsert(&doc)).await?;
        self.geo.upsert(product)
    }

    /// Drop a product from both indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if either index rejects the write.
    pub async fn remove(&self, id: ProductId) -> Result<(), SearchError> {
        let text = self.text.clone();
        blocking(move || text.remove(id)).await?;
        self.geo.remove(id)
    }

    /// Replace both indexes with `products`.
    ///
    /// # Errors
    ///
    /// Returns an error if either index cannot be rebuilt.
    pub async fn replace_all(&self, products: Vec<Product>) -> Result<(), SearchError> {
        let text = self.text.clone();
        let products = Arc::new(products);
        let docs = Arc::clone(&products);
        blocking(move || text.replace_all(&docs)).await?;
        self.geo.replace_all(&products)
    }
}

/// Run a Tantivy write off the async workers.
async fn blocking<F>(write: F) -> Result<(), SearchError>
where
    F: FnOnce() -> Result<(), SearchError> + Send + 'static,
{
    tokio::task::spawn_blocking(write)
        .await
        .map_err(|e| SearchError::Index(format!("Index task failed: {e}")))?
}

/// A validated proximity query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearQuery {
    pub origin: GeoPoint,
    pub limit: usize,
}

impl NearQuery {
    /// Parse raw query parameters.
    ///
    /// A missing limit means [`DEFAULT_NEAR_LIMIT`]; any limit is clamped to
    /// `1..=MAX_NEAR_LIMIT`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Validation` for missing, non-numeric, or
    /// out-of-range coordinates, or a non-numeric limit.
    pub fn parse(
        lng: Option<&str>,
        lat: Option<&str>,
        limit: Option<&str>,
    ) -> Result<Self, CatalogError> {
        let (Some(lng), Some(lat)) = (lng, lat) else {
            return Err(CatalogError::validation("lng and lat are required"));
        };
        let origin = parse_point(lng, lat)?;

        let limit = match limit.map(str::trim).filter(|l| !l.is_empty()) {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| {
                    CatalogError::validation(format!("limit must be a whole number (got {raw:?})"))
                })?
                .clamp(1, MAX_NEAR_LIMIT),
            None => DEFAULT_NEAR_LIMIT,
        };

        Ok(Self { origin, limit })
    }
}

/// Executes text and proximity queries.
#[derive(Clone)]
pub struct SearchEngine {
    store: ProductStore,
}

impl SearchEngine {
    #[must_use]
    pub const fn new(store: ProductStore) -> Self {
        Self { store }
    }

    /// Products matching `query`, most relevant first.
    ///
    /// An empty or non-matching query yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if the index or repository fails.
    #[instrument(skip(self))]
    pub async fn search_by_text(&self, query: &str) -> Result<Vec<Product>, CatalogError> {
        let text = &self.store.indexes().text;
        let limit = usize::try_from(text.num_docs()).unwrap_or(usize::MAX).max(1);
        let ids: Vec<_> = text.search(query, limit)?.into_iter().map(|(id, _)| id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store.get_many(&ids).await
    }

    /// Up to `query.limit` products, nearest first.
    ///
    /// Index hits are resolved in batches of `query.limit` until enough live
    /// products are found, so an entry whose record is gone never takes a
    /// result slot.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if the index or repository fails.
    #[instrument(skip(self))]
    pub async fn search_near(&self, query: NearQuery) -> Result<Vec<NearbyProduct>, CatalogError> {
        let geo = &self.store.indexes().geo;
        let ids: Vec<_> = geo
            .nearest(query.origin, geo.len())?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let mut found = Vec::with_capacity(query.limit);
        for batch in ids.chunks(query.limit.max(1)) {
            let products = self.store.get_many(batch).await?;
            if products.len() < batch.len() {
                debug!(
                    missing = batch.len() - products.len(),
                    "Skipped index entries without a record"
                );
            }
            found.extend(products.iter().map(NearbyProduct::from));
            if found.len() >= query.limit {
                break;
            }
        }
        found.truncate(query.limit);
        Ok(found)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use souk_core::UserId;

    use super::*;
    use crate::db::MemoryProductRepository;
    use crate::models::{LocationFields, NewProduct, ProductFields};

    fn fields(name: &str, description: &str, lng: f64, lat: f64) -> NewProduct {
        NewProduct::try_from(ProductFields {
            name: Some(name.to_owned()),
            description: Some(description.to_owned()),
            price: Some("12.50".to_owned()),
            tags: None,
            location: LocationFields {
                kind: None,
                address: Some("Somewhere".to_owned()),
                lng: Some(lng.to_string()),
                lat: Some(lat.to_string()),
            },
        })
        .unwrap()
    }

    fn engine() -> (ProductStore, SearchEngine) {
        let store = ProductStore::new(
            Arc::new(MemoryProductRepository::new()),
            CatalogIndexes::new().unwrap(),
            Duration::from_secs(5),
        );
        (store.clone(), SearchEngine::new(store))
    }

    #[test]
    fn test_near_query_defaults_and_clamps() {
        let q = NearQuery::parse(Some("-0.1"), Some("51.5"), None).unwrap();
        assert_eq!(q.limit, DEFAULT_NEAR_LIMIT);
        assert_eq!(q.origin, GeoPoint::new(-0.1, 51.5).unwrap());

        let q = NearQuery::parse(Some("-0.1"), Some("51.5"), Some("0")).unwrap();
        assert_eq!(q.limit, 1);
        let q = NearQuery::parse(Some("-0.1"), Some("51.5"), Some("5000")).unwrap();
        assert_eq!(q.limit, MAX_NEAR_LIMIT);
    }

    #[test]
    fn test_near_query_rejects_malformed_input() {
        for (lng, lat, limit) in [
            (Some("abc"), Some("51.5"), None),
            (Some("-0.1"), None, None),
            (Some("-0.1"), Some("91"), None),
            (Some("-0.1"), Some("51.5"), Some("ten")),
        ] {
            assert!(matches!(
                NearQuery::parse(lng, lat, limit),
                Err(CatalogError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_search_by_text_ranks_and_empty_on_no_match() {
        let (store, engine) = engine();
        let seller = UserId::generate();
        let lamp = store
            .create(fields("Reading lamp", "lamp lamp lamp", 0.0, 0.0), seller)
            .await
            .unwrap();
        let desk = store
            .create(fields("Desk", "comes with a lamp", 0.0, 0.0), seller)
            .await
            .unwrap();

        let found = engine.search_by_text("lamp").await.unwrap();
        assert_eq!(
            found.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![lamp.id, desk.id]
        );
        assert!(engine.search_by_text("zeppelin").await.unwrap().is_empty());
        assert!(engine.search_by_text("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_near_is_ordered_and_limited() {
        let (store, engine) = engine();
        let seller = UserId::generate();
        for i in 0..12 {
            let offset = f64::from(i) * 0.05;
            store
                .create(fields(&format!("Item {i}"), "", -0.1 + offset, 51.5), seller)
                .await
                .unwrap();
        }

        let query = NearQuery::parse(Some("-0.1"), Some("51.5"), Some("10")).unwrap();
        let found = engine.search_near(query).await.unwrap();
        assert_eq!(found.len(), 10);

        let distances: Vec<_> = found
            .iter()
            .map(|p| query.origin.distance_meters(&p.location.coordinates()))
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(found[0].name, "Item 0");
    }

    #[tokio::test]
    async fn test_search_near_skips_entries_without_record() {
        let (store, engine) = engine();
        let seller = UserId::generate();
        let live = store
            .create(fields("Live lamp", "", 0.5, 0.0), seller)
            .await
            .unwrap();

        // closer than the live product, but not in the repository
        let mut ghost = live.clone();
        ghost.id = ProductId::generate();
        ghost.location = souk_core::Location::new(GeoPoint::new(0.0, 0.0).unwrap(), "here").unwrap();
        store.indexes().upsert(&ghost).await.unwrap();

        let query = NearQuery::parse(Some("0"), Some("0"), Some("1")).unwrap();
        let found = engine.search_near(query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Live lamp");

        let found = engine.search_by_text("lamp").await.unwrap();
        assert_eq!(found.iter().map(|p| p.id).collect::<Vec<_>>(), vec![live.id]);
    }
}
