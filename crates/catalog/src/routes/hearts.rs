//! Favorites route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use souk_core::ProductId;

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::Product;
use crate::routes::parse_product_id;
use crate::state::AppState;

/// Response to a heart toggle.
#[derive(Debug, Serialize)]
pub struct HeartsResponse {
    pub hearts: Vec<ProductId>,
}

/// Heart or un-heart a product for the current user.
#[instrument(skip(state))]
pub async fn toggle(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<HeartsResponse>> {
    let id = parse_product_id(&id)?;
    let hearts = state.favorites().toggle_heart(user, id).await?;
    Ok(Json(HeartsResponse { hearts }))
}

/// The current user's hearted products.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.favorites().get_hearted(user).await?))
}
