//! HTTP route handlers for the catalog JSON API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                    - Liveness check
//! GET    /health/ready              - Readiness check (database)
//!
//! # Products
//! GET    /                          - Product listing
//! GET    /products                  - Product listing
//! POST   /products                  - Create (multipart, requires user)
//! GET    /products/{id}             - Product by id
//! POST   /products/{id}             - Update (multipart, seller only)
//! DELETE /products/{id}             - Delete (seller only)
//! GET    /product/{slug}            - Product by slug
//!
//! # Tags
//! GET    /tags                      - Histogram and all tagged products
//! GET    /tags/{tag}                - Histogram and products under a tag
//!
//! # Search
//! GET    /api/search?q=             - Text search
//! GET    /api/products/near?lng=&lat=&limit= - Proximity search
//!
//! # Hearts (requires user)
//! POST   /api/products/{id}/heart   - Toggle heart
//! GET    /hearts                    - Hearted products
//!
//! # Photos
//! GET    /uploads/{file}            - Stored photo
//! ```

pub mod form;
pub mod hearts;
pub mod products;
pub mod search;
pub mod tags;
pub mod uploads;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use souk_core::ProductId;

use crate::error::CatalogError;
use crate::state::AppState;

/// Create the catalog routes router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/products", get(products::index).post(products::create))
        .route(
            "/products/{id}",
            get(products::show)
                .post(products::update)
                .delete(products::delete),
        )
        .route("/product/{slug}", get(products::show_by_slug))
        .route("/tags", get(tags::index))
        .route("/tags/{tag}", get(tags::show))
        .route("/api/search", get(search::search))
        .route("/api/products/near", get(search::near))
        .route("/api/products/{id}/heart", post(hearts::toggle))
        .route("/hearts", get(hearts::index))
        .route("/uploads/{file}", get(uploads::show))
}

/// Build the full application: routes, health checks, and middleware.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config().max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Parse a product id from a path segment.
pub(crate) fn parse_product_id(raw: &str) -> Result<ProductId, CatalogError> {
    raw.parse()
        .map_err(|_| CatalogError::validation(format!("{raw:?} is not a valid product id")))
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies database connectivity when a database is configured.
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    let Some(pool) = state.pool() else {
        return StatusCode::OK;
    };
    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
