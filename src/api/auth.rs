//! Authentication middleware for API key validation

use super::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

/// Authentication middleware
///
/// If `api_key` is configured, validates `Authorization: Bearer <api_key>`.
/// With no key configured all requests are allowed.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_key) = &state.api_key else {
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match auth_header.and_then(bearer_token) {
        Some(provided_key) if provided_key == expected_key.as_str() => next.run(request).await,
        Some(_) => unauthorized("Invalid API key"),
        None if auth_header.is_some() => {
            unauthorized("Invalid Authorization header format. Expected: Bearer <api_key>")
        }
        None => unauthorized("API key required. Set Authorization: Bearer <api_key>"),
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ")
}

fn unauthorized(error: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": error })),
    )
        .into_response()
}
