//! Bearer authentication for the management API.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::ApiState;
use crate::error::ApiAuthError;

/// Gate a request on `Authorization: Bearer <key>`.
///
/// The distinct 401 messages (missing header / missing key / invalid key)
/// are part of the API contract.
pub async fn bearer_auth_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let failure = match header {
        None => ApiAuthError::MissingHeader,
        // The scheme is "Bearer <key>"; anything without the separating
        // space is not a bearer token.
        Some(value) => match value.strip_prefix("Bearer ") {
            None => ApiAuthError::MissingKey,
            Some(token) => {
                let token = token.trim();
                if token.is_empty() {
                    ApiAuthError::MissingKey
                } else if token == state.api_key {
                    return next.run(request).await;
                } else {
                    ApiAuthError::InvalidKey
                }
            }
        },
    };

    tracing::warn!(reason = ?failure, "Management API request rejected");
    (StatusCode::UNAUTHORIZED, failure.to_string()).into_response()
}
