// crates/server/src/routes/health.rs
//! Health check endpoints.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Response for the health check endpoint.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /api/health - Health check endpoint.
///
/// Returns server status, version, and uptime.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
    })
}

/// GET / - Service banner.
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "scrape-hub",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Create the health routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

/// Routes mounted outside the `/api` prefix.
pub fn root_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(root))
}
