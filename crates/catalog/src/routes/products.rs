//! Product route handlers.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::instrument;

use crate::error::{CatalogError, Result};
use crate::middleware::RequireUser;
use crate::models::{NewProduct, Product, ProductPatch};
use crate::routes::form::{Upload, read_product_form};
use crate::routes::parse_product_id;
use crate::state::AppState;

/// List all products.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.store().list().await?))
}

/// Create a product from a multipart form.
#[instrument(skip(state, multipart))]
pub async fn create(
    State(state): State<AppState>,
    RequireUser(seller): RequireUser,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let form = read_product_form(multipart).await?;
    // Validate before paying for image processing.
    let mut input = NewProduct::try_from(form.fields)?;
    input.photo = ingest(&state, form.photo).await?;
    let photo = input.photo.clone();

    let created = state.store().create(input, seller).await;
    let product = discard_on_error(&state, photo, created).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Show a product by id.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Product>> {
    let id = parse_product_id(&id)?;
    Ok(Json(state.store().get_by_id(id).await?))
}

/// Show a product by slug.
#[instrument(skip(state))]
pub async fn show_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Product>> {
    Ok(Json(state.store().get_by_slug(&slug).await?))
}

/// Update a product from a multipart form. Only the seller may do this.
#[instrument(skip(state, multipart))]
pub async fn update(
    State(state): State<AppState>,
    RequireUser(requester): RequireUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Product>> {
    let id = parse_product_id(&id)?;
    // Reject strangers before reading the body or touching the image pipeline.
    state.store().ensure_can_modify(id, requester).await?;

    let form = read_product_form(multipart).await?;
    let mut patch = ProductPatch::try_from(form.fields)?;
    patch.photo = ingest(&state, form.photo).await?;
    let photo = patch.photo.clone();

    let updated = state.store().update(id, patch, requester).await;
    Ok(Json(discard_on_error(&state, photo, updated).await?))
}

/// Delete a product. Only the seller may do this.
#[instrument(skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    RequireUser(requester): RequireUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_product_id(&id)?;
    state.store().delete(id, requester).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Remove a freshly stored photo when the write that would reference it failed.
async fn discard_on_error<T>(
    state: &AppState,
    photo: Option<String>,
    result: std::result::Result<T, CatalogError>,
) -> std::result::Result<T, CatalogError> {
    if let (Err(_), Some(photo)) = (&result, photo) {
        state.images().discard(&photo).await;
    }
    result
}

async fn ingest(state: &AppState, upload: Option<Upload>) -> Result<Option<String>> {
    let Some(upload) = upload else {
        return Ok(None);
    };
    let filename = state
        .images()
        .ingest(upload.bytes, &upload.content_type)
        .await
        .map_err(CatalogError::from)?;
    Ok(Some(filename))
}
