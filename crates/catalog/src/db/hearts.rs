//! Favorites ("hearts") repository backed by `PostgreSQL`.
//!
//! Each user has at most one row holding an array of product ids. The toggle
//! is a single upsert statement, so concurrent toggles from the same user
//! serialize on the row lock and the array never holds duplicates.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use souk_core::{ProductId, UserId};

use super::{HeartRepository, RepositoryError};

/// Repository for favorites database operations.
#[derive(Debug, Clone)]
pub struct PgHeartRepository {
    pool: PgPool,
}

impl PgHeartRepository {
    /// Create a new hearts repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HeartRepository for PgHeartRepository {
    async fn hearts(&self, user: UserId) -> Result<Vec<ProductId>, RepositoryError> {
        let row: Option<(Vec<Uuid>,)> =
            sqlx::query_as("SELECT hearts FROM catalog.user_hearts WHERE user_id = $1")
                .bind(user)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row
            .map(|(hearts,)| hearts.into_iter().map(ProductId::new).collect())
            .unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn toggle(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<Vec<ProductId>, RepositoryError> {
        let (hearts,): (Vec<Uuid>,) = sqlx::query_as(
            r"
            INSERT INTO catalog.user_hearts AS h (user_id, hearts)
            VALUES ($1, ARRAY[$2::uuid])
            ON CONFLICT (user_id) DO UPDATE
            SET hearts = CASE
                WHEN $2::uuid = ANY(h.hearts) THEN array_remove(h.hearts, $2::uuid)
                ELSE array_append(h.hearts, $2::uuid)
            END
            RETURNING hearts
            ",
        )
        .bind(user)
        .bind(product)
        .fetch_one(&self.pool)
        .await?;

        debug!(count = hearts.len(), "Toggled heart");
        Ok(hearts.into_iter().map(ProductId::new).collect())
    }
}
