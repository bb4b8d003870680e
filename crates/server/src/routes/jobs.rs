// crates/server/src/routes/jobs.rs
//! API routes for observing scrape jobs across all sources.
//!
//! - GET /jobs: List live jobs
//! - GET /jobs/stream: SSE stream of job snapshot changes

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use scrape_hub_server_jobs::JobSnapshot;

use crate::state::AppState;

/// GET /api/jobs: List all live jobs.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSnapshot>> {
    Json(state.jobs.active_jobs())
}

/// GET /api/jobs/stream: SSE stream of every job snapshot change.
///
/// Events are named after the job state (`running`, `completed`, ...).
async fn stream_jobs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.jobs.subscribe();

    let stream = async_stream::stream! {
        let mut rx = rx;
        loop {
            match rx.recv().await {
                Ok(snapshot) => {
                    let json = match serde_json::to_string(&snapshot) {
                        Ok(j) => j,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize job snapshot");
                            continue;
                        }
                    };
                    yield Ok(Event::default().event(snapshot.state.as_str()).data(json));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Job stream subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/stream", get(stream_jobs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_creation() {
        let _router = router();
    }
}
