//! Search route handlers.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use crate::error::Result;
use crate::models::{NearbyProduct, Product};
use crate::search::NearQuery;
use crate::state::AppState;

/// Text search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Proximity search query parameters, kept as strings so malformed numbers
/// are reported as validation errors.
#[derive(Debug, Deserialize)]
pub struct NearParams {
    pub lng: Option<String>,
    pub lat: Option<String>,
    pub limit: Option<String>,
}

/// Products ranked by text relevance.
#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.search().search_by_text(&query.q).await?))
}

/// Products nearest to a point.
#[instrument(skip(state))]
pub async fn near(
    State(state): State<AppState>,
    Query(params): Query<NearParams>,
) -> Result<Json<Vec<NearbyProduct>>> {
    let query = NearQuery::parse(
        params.lng.as_deref(),
        params.lat.as_deref(),
        params.limit.as_deref(),
    )?;
    Ok(Json(state.search().search_near(query).await?))
}
