//! Product repository backed by `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use souk_core::{GeoPoint, Location, Price, ProductId, Slug, UserId, slug_family_pattern};

use super::{ProductRepository, RepositoryError, map_unique_violation};
use crate::models::Product;

const PRODUCT_COLUMNS: &str = "id, name, slug, description, price, tags, created, \
     location_lng, location_lat, location_address, photo, seller";

/// Row shape of `catalog.products`.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    price: Decimal,
    tags: Vec<String>,
    created: DateTime<Utc>,
    location_lng: f64,
    location_lat: f64,
    location_address: String,
    photo: Option<String>,
    seller: Uuid,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            RepositoryError::DataCorruption(format!("invalid {what} for product {}: {e}", row.id))
        };

        let point = GeoPoint::new(row.location_lng, row.location_lat)
            .map_err(|e| corrupt("coordinates", &e))?;
        let location =
            Location::new(point, &row.location_address).map_err(|e| corrupt("address", &e))?;
        let price = Price::new(row.price).map_err(|e| corrupt("price", &e))?;

        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            slug: Slug::from_stored(row.slug),
            description: row.description,
            price,
            tags: row.tags,
            created: row.created,
            location,
            photo: row.photo,
            seller: UserId::new(row.seller),
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    #[instrument(skip(self, product), fields(slug = %product.slug))]
    async fn insert(&self, product: &Product) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO catalog.products
                (id, name, slug, description, price, tags, created,
                 location_lng, location_lat, location_address, photo, seller)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.slug.as_str())
        .bind(product.description.as_deref())
        .bind(product.price.amount())
        .bind(&product.tags)
        .bind(product.created)
        .bind(product.location.coordinates().lng())
        .bind(product.location.coordinates().lat())
        .bind(product.location.address())
        .bind(product.photo.as_deref())
        .bind(product.seller)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "slug"))?;

        debug!(id = %product.id, "Inserted product");
        Ok(())
    }

    #[instrument(skip(self, product), fields(id = %product.id))]
    async fn update(&self, product: &Product) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE catalog.products
            SET name = $2, slug = $3, description = $4, price = $5, tags = $6,
                location_lng = $7, location_lat = $8, location_address = $9, photo = $10
            WHERE id = $1
            ",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.slug.as_str())
        .bind(product.description.as_deref())
        .bind(product.price.amount())
        .bind(&product.tags)
        .bind(product.location.coordinates().lng())
        .bind(product.location.coordinates().lat())
        .bind(product.location.address())
        .bind(product.photo.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "slug"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM catalog.products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM catalog.products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM catalog.products WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let uuids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM catalog.products WHERE id = ANY($1)"
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;

        let mut found = into_products(rows)?;
        // Restore the caller's order; ids that no longer exist are dropped.
        Ok(ids
            .iter()
            .filter_map(|id| {
                let pos = found.iter().position(|p| p.id == *id)?;
                Some(found.swap_remove(pos))
            })
            .collect())
    }

    async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM catalog.products ORDER BY created, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        into_products(rows)
    }

    async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            r"
            SELECT {PRODUCT_COLUMNS} FROM catalog.products
            WHERE CASE WHEN $1::text IS NULL THEN cardinality(tags) > 0
                       ELSE $1 = ANY(tags) END
            ORDER BY created, id
            "
        ))
        .bind(tag)
        .fetch_all(&self.pool)
        .await?;

        into_products(rows)
    }

    async fn count_slug_family(
        &self,
        base: &Slug,
        exclude: Option<ProductId>,
    ) -> Result<usize, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM catalog.products
            WHERE slug ~* $1 AND ($2::uuid IS NULL OR id <> $2)
            ",
        )
        .bind(slug_family_pattern(base))
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;

        usize::try_from(count)
            .map_err(|_| RepositoryError::DataCorruption(format!("negative count {count}")))
    }
}
