//! Tag frequency histogram.

use std::collections::HashMap;

use serde::Serialize;
use tracing::instrument;

use crate::error::CatalogError;
use crate::models::{Product, TagCount};
use crate::store::ProductStore;

/// The tags page: the histogram alongside the products under one tag.
#[derive(Debug, Clone, Serialize)]
pub struct TagPage {
    pub tags: Vec<TagCount>,
    /// The selected tag, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub products: Vec<Product>,
}

/// Computes tag counts over the catalog.
#[derive(Clone)]
pub struct TagAggregator {
    store: ProductStore,
}

impl TagAggregator {
    #[must_use]
    pub const fn new(store: ProductStore) -> Self {
        Self { store }
    }

    /// Every tag with the number of times it is used, most used first.
    ///
    /// A tag repeated on one product counts each time. Equal counts are
    /// ordered alphabetically.
    ///
    /// # Errors
    ///
    /// `Storage` on repository failure.
    #[instrument(skip(self))]
    pub async fn histogram(&self) -> Result<Vec<TagCount>, CatalogError> {
        let products = self.store.list_by_tag(None).await?;
        Ok(count_tags(&products))
    }

    /// The histogram plus the products carrying `tag` (every tagged product
    /// when `tag` is `None`). Both queries run concurrently.
    ///
    /// # Errors
    ///
    /// `Storage` on repository failure.
    #[instrument(skip(self))]
    pub async fn tag_page(&self, tag: Option<&str>) -> Result<TagPage, CatalogError> {
        let (tags, products) = tokio::try_join!(self.histogram(), self.store.list_by_tag(tag))?;
        Ok(TagPage {
            tags,
            tag: tag.map(str::to_owned),
            products,
        })
    }
}

fn count_tags(products: &[Product]) -> Vec<TagCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in products.iter().flat_map(|p| &p.tags) {
        *counts.entry(tag.as_str()).or_default() += 1;
    }

    let mut histogram: Vec<_> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_owned(),
            count,
        })
        .collect();
    histogram.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    histogram
}
