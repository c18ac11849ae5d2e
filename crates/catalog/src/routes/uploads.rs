//! Serves stored photos.

use std::path::Path as FsPath;

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use image::ImageFormat;
use tracing::instrument;

use crate::error::{CatalogError, Result};
use crate::images::BlobError;
use crate::state::AppState;

/// Photo bytes with a content type guessed from the file extension.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse> {
    let read = state.images().blobs().get(&file);
    let bytes = tokio::time::timeout(state.config().storage_timeout, read)
        .await
        .map_err(|_| CatalogError::Storage("photo read timed out".to_owned()))?
        .map_err(|e| match e {
            BlobError::InvalidKey(_) => CatalogError::NotFound("photo".to_owned()),
            BlobError::Io(e) => CatalogError::Storage(e.to_string()),
        })?
        .ok_or_else(|| CatalogError::NotFound("photo".to_owned()))?;

    let content_type = FsPath::new(&file)
        .extension()
        .and_then(ImageFormat::from_extension)
        .map_or("application/octet-stream", |format| format.to_mime_type());

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
