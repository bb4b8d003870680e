//! GET /leads: latest leads, optionally filtered by source.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use scrape_hub_core::Source;
use scrape_hub_db::LeadRow;

use super::clamp_limit;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LeadsQuery {
    pub limit: Option<i64>,
    pub source: Option<String>,
}

async fn latest_leads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeadsQuery>,
) -> ApiResult<Json<Vec<LeadRow>>> {
    let limit = clamp_limit(query.limit, 100, 1000);
    let source = query
        .source
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Source>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))
        })
        .transpose()?;
    Ok(Json(state.db.latest_leads(limit, source).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/leads", get(latest_leads))
}
