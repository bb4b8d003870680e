//! GET /runs: recent scrape runs.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use scrape_hub_db::RunRow;

use super::clamp_limit;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<i64>,
}

async fn recent_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunsQuery>,
) -> ApiResult<Json<Vec<RunRow>>> {
    let limit = clamp_limit(query.limit, 10, 200);
    Ok(Json(state.db.recent_runs(limit).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/runs", get(recent_runs))
}
