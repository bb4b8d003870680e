//! API route handlers for the scrape-hub server.

pub mod health;
pub mod jobs;
pub mod leads;
pub mod runs;
pub mod scrape;
pub mod status_changes;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health - Health check
/// - GET  /api/sources - Configured sources
/// - POST /api/scrape/{source} - Start (or attach to) a scrape job
/// - GET  /api/scrape-progress/{source} - Job snapshot for a source
/// - POST /api/scrape-cancel/{source} - Request cooperative cancellation
/// - GET  /api/jobs - Live job snapshots
/// - GET  /api/jobs/stream - SSE stream of job snapshot changes
/// - GET  /api/runs - Recent scrape runs
/// - GET  /api/leads - Latest leads
/// - GET  /api/status-changes - Recent lead status changes
/// - POST /api/status-changes/seen - Mark status changes as seen
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::root_router())
        .nest("/api", health::router())
        .nest("/api", scrape::router())
        .nest("/api", jobs::router())
        .nest("/api", runs::router())
        .nest("/api", leads::router())
        .nest("/api", status_changes::router())
        .with_state(state)
}

/// Clamp a user-supplied `limit` query parameter.
pub(crate) fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}
