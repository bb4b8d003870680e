//! Scrape job routes.
//!
//! - GET  /sources: configured sources with their job state
//! - POST /scrape/{source}: start a scrape, or attach to the live one
//! - GET  /scrape-progress/{source}: snapshot of the source's job; with
//!   `?execution=N`, of that execution even after a newer start replaced it
//! - POST /scrape-cancel/{source}: ask the live job to stop
//!
//! A job that failed is reported through its snapshot, never as an HTTP
//! error. Only an unknown source is.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use scrape_hub_core::Source;
use scrape_hub_server_jobs::{
    CancelResponse, ExecutionId, JobSnapshot, StartOutcome, StartResponse,
};

use crate::error::ApiResult;
use crate::pipeline;
use crate::state::AppState;

/// Entry of GET /api/sources.
#[derive(Debug, Serialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub key: Source,
    pub label: String,
    pub max_pages: u32,
    pub job: JobSnapshot,
}

/// GET /api/sources
async fn list_sources(State(state): State<Arc<AppState>>) -> Json<Vec<SourceInfo>> {
    let sources = state
        .extractors
        .iter()
        .map(|(source, extractor)| SourceInfo {
            key: *source,
            label: source.label().to_string(),
            max_pages: extractor.max_pages(),
            job: state
                .jobs
                .snapshot(source.key())
                .unwrap_or_else(|| JobSnapshot::idle(source.key())),
        })
        .collect();
    Json(sources)
}

/// POST /api/scrape/{source}: 202 when a job was started, 200 when one was
/// already live.
async fn start_scrape(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<(StatusCode, Json<StartResponse>)> {
    let (source, extractor) = state.extractor(&key)?;
    let store = Arc::clone(&state.store);

    let outcome = state.jobs.start(source.key(), move |ctx| {
        pipeline::run_scrape(ctx, extractor, store)
    });

    let status = match &outcome {
        StartOutcome::Started(snap) => {
            tracing::info!(source = %source, execution_id = ?snap.execution_id, "Scrape started");
            StatusCode::ACCEPTED
        }
        StartOutcome::AlreadyRunning(snap) => {
            tracing::info!(source = %source, execution_id = ?snap.execution_id, "Scrape already running");
            StatusCode::OK
        }
    };
    Ok((status, Json(StartResponse::from(outcome))))
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub execution: Option<ExecutionId>,
}

/// GET /api/scrape-progress/{source}
///
/// An execution that is unknown or already evicted reads as idle.
async fn scrape_progress(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<ProgressQuery>,
) -> ApiResult<Json<JobSnapshot>> {
    let (source, _) = state.extractor(&key)?;
    let snapshot = match query.execution {
        Some(id) => state.jobs.snapshot_of(source.key(), id),
        None => state.jobs.snapshot(source.key()),
    };
    Ok(Json(snapshot.unwrap_or_else(|| JobSnapshot::idle(source.key()))))
}

/// POST /api/scrape-cancel/{source}
async fn cancel_scrape(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let (source, _) = state.extractor(&key)?;
    let acknowledged = state.jobs.request_cancel(source.key());
    if !acknowledged {
        tracing::debug!(source = %source, "Cancel requested with no live job");
    }
    Ok(Json(CancelResponse { acknowledged }))
}

/// Build the scrape router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sources", get(list_sources))
        .route("/scrape/{source}", post(start_scrape))
        .route("/scrape-progress/{source}", get(scrape_progress))
        .route("/scrape-cancel/{source}", post(cancel_scrape))
}
