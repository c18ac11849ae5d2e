//! Proximity index over product coordinates.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use souk_core::{GeoPoint, ProductId};

use super::SearchError;
use crate::models::Product;

/// Product coordinates keyed by id.
///
/// Queries scan every point; the catalog is small enough that a sorted
/// full scan beats maintaining a spatial tree.
#[derive(Debug, Clone, Default)]
pub struct GeoIndex {
    points: Arc<RwLock<HashMap<ProductId, GeoPoint>>>,
}

impl GeoIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or move a product's point.
    ///
    /// # Errors
    ///
    /// Returns an error if the index lock is poisoned.
    pub fn upsert(&self, product: &Product) -> Result<(), SearchError> {
        self.points
            .write()
            .map_err(|_| poisoned())?
            .insert(product.id, product.location.coordinates());
        Ok(())
    }

    /// Forget a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the index lock is poisoned.
    pub fn remove(&self, id: ProductId) -> Result<(), SearchError> {
        self.points.write().map_err(|_| poisoned())?.remove(&id);
        Ok(())
    }

    /// Replace the whole index with `products`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index lock is poisoned.
    pub fn replace_all(&self, products: &[Product]) -> Result<(), SearchError> {
        let fresh = products
            .iter()
            .map(|p| (p.id, p.location.coordinates()))
            .collect();
        *self.points.write().map_err(|_| poisoned())? = fresh;
        Ok(())
    }

    /// Up to `limit` product ids nearest to `origin`, closest first, with
    /// their distance in meters. Equal distances are ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the index lock is poisoned.
    pub fn nearest(
        &self,
        origin: GeoPoint,
        limit: usize,
    ) -> Result<Vec<(ProductId, f64)>, SearchError> {
        let points = self.points.read().map_err(|_| poisoned())?;
        let mut hits: Vec<_> = points
            .iter()
            .map(|(id, point)| (*id, origin.distance_meters(point)))
            .collect();
        drop(points);

        hits.sort_by(|(a_id, a), (b_id, b)| a.total_cmp(b).then_with(|| a_id.cmp(b_id)));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Number of indexed products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.read().map_or(0, |points| points.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> SearchError {
    SearchError::Index("geo index lock poisoned".to_owned())
}
