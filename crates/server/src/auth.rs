//! Shared-secret authentication via the `X-API-Key` header.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Paths reachable without a key.
const PUBLIC_PATHS: &[&str] = &["/", "/api/health"];

/// Reject requests whose `X-API-Key` does not match the configured secret.
/// A no-op when no secret is configured.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(secret) = state.api_secret.as_deref() else {
        return next.run(request).await;
    };
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided == Some(secret) {
        next.run(request).await
    } else {
        tracing::debug!(path = %request.uri().path(), "API key check failed");
        ApiError::Unauthorized.into_response()
    }
}
