//! Login-required gate.
//!
//! The authentication service sits in front of the catalog and forwards the
//! authenticated user's id in the `x-user-id` header. Handlers that mutate
//! data or read personal state take a [`RequireUser`] argument.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use souk_core::UserId;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor that requires an authenticated user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireUser(user_id): RequireUser) -> impl IntoResponse {
///     format!("Hello, {user_id}!")
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireUser(pub UserId);

/// Returned when a handler requires a user and none (or garbage) was forwarded.
#[derive(Debug)]
pub enum AuthRejection {
    /// No identity header on the request.
    MissingUser,
    /// The identity header is not a valid user id.
    InvalidUser,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::MissingUser => "You must be logged in to do that",
            Self::InvalidUser => "Invalid user identity",
        };
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
    }
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or(AuthRejection::MissingUser)?
            .to_str()
            .map_err(|_| AuthRejection::InvalidUser)?;

        let user_id = raw.parse().map_err(|_| AuthRejection::InvalidUser)?;

        tracing::Span::current().record("user_id", raw);

        Ok(Self(user_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> Result<RequireUser, AuthRejection> {
        let (mut parts, ()) = request.into_parts();
        RequireUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_missing_header_is_rejected() {
        let request = Request::builder().uri("/hearts").body(()).unwrap();
        assert!(matches!(
            extract(request).await,
            Err(AuthRejection::MissingUser)
        ));
    }

    #[tokio::test]
    async fn test_invalid_header_is_rejected() {
        let request = Request::builder()
            .uri("/hearts")
            .header(USER_ID_HEADER, "admin")
            .body(())
            .unwrap();
        assert!(matches!(
            extract(request).await,
            Err(AuthRejection::InvalidUser)
        ));
    }

    #[tokio::test]
    async fn test_valid_header_yields_user() {
        let user = UserId::generate();
        let request = Request::builder()
            .uri("/hearts")
            .header(USER_ID_HEADER, user.to_string())
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().0, user);
    }

    #[test]
    fn test_rejection_is_unauthorized() {
        assert_eq!(
            AuthRejection::MissingUser.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
