//! Unified error handling with Sentry integration.
//!
//! Two layers:
//! - [`CatalogError`] is the domain taxonomy returned by every catalog
//!   component (store, search, images, tags, favorites).
//! - [`AppError`] is what route handlers return. It captures server-side
//!   failures to Sentry before responding to the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::images::ImageError;
use crate::search::SearchError;

/// Domain-level failure of a catalog operation.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Missing or invalid input (required field, mimetype, coordinates).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requester may not perform this operation (e.g. not the seller).
    #[error("not allowed: {0}")]
    Forbidden(String),

    /// Unknown product id or slug.
    #[error("{0} not found")]
    NotFound(String),

    /// Uniqueness could not be established (slug collisions exhausted).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Durable store, blob store, or index failure (including timeouts).
    #[error("storage error: {0}")]
    Storage(String),
}

impl CatalogError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn product_not_found() -> Self {
        Self::NotFound("product".to_owned())
    }
}

impl From<RepositoryError> for CatalogError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::product_not_found(),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<ImageError> for CatalogError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::UnsupportedType(_) | ImageError::Decode(_) => {
                Self::Validation(err.to_string())
            }
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<SearchError> for CatalogError {
    fn from(err: SearchError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Application-level error type for HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// A catalog operation failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// No authenticated user on the request.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed request that never reached the catalog.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Catalog(CatalogError::Storage(_)) | Self::Internal(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Catalog(err) => match err {
                CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
                CatalogError::Forbidden(_) => StatusCode::FORBIDDEN,
                CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
                CatalogError::Conflict(_) => StatusCode::CONFLICT,
                CatalogError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Catalog(CatalogError::Storage(_)) => {
                "Storage is unavailable, please try again".to_string()
            }
            Self::Catalog(CatalogError::Conflict(_)) => {
                "Could not save the product, please try again".to_string()
            }
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
