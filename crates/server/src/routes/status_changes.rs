//! Lead status change routes.
//!
//! - GET  /status-changes     : Recent changes, newest first
//! - POST /status-changes/seen: Mark changes as seen

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use scrape_hub_db::StatusChangeRow;

use super::clamp_limit;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Most ids accepted by one mark-seen request.
const MAX_MARK_SEEN: usize = 500;

#[derive(Debug, Deserialize)]
pub struct StatusChangesQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
pub struct MarkSeenRequest {
    #[ts(type = "number[]")]
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
pub struct MarkSeenResponse {
    #[ts(type = "number")]
    pub updated: u64,
}

async fn recent_status_changes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusChangesQuery>,
) -> ApiResult<Json<Vec<StatusChangeRow>>> {
    let limit = clamp_limit(query.limit, 20, 500);
    Ok(Json(state.db.recent_status_changes(limit).await?))
}

async fn mark_seen(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MarkSeenRequest>,
) -> ApiResult<Json<MarkSeenResponse>> {
    if body.ids.len() > MAX_MARK_SEEN {
        return Err(ApiError::BadRequest(format!(
            "at most {MAX_MARK_SEEN} ids per request"
        )));
    }
    let updated = state.db.mark_status_changes_seen(&body.ids).await?;
    Ok(Json(MarkSeenResponse { updated }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status-changes", get(recent_status_changes))
        .route("/status-changes/seen", post(mark_seen))
}
