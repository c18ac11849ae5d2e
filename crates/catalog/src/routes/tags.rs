//! Tag route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use crate::error::Result;
use crate::state::AppState;
use crate::tags::TagPage;

/// Tag histogram with every tagged product.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<TagPage>> {
    Ok(Json(state.tags().tag_page(None).await?))
}

/// Tag histogram with the products under one tag.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(tag): Path<String>) -> Result<Json<TagPage>> {
    Ok(Json(state.tags().tag_page(Some(&tag)).await?))
}
