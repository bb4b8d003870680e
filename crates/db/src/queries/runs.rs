//! Scrape run bookkeeping.

use chrono::{DateTime, Utc};
use scrape_hub_core::{RunStatus, Source};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::from_unix;
use crate::{Database, DbResult};

/// One persisted scrape run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
#[serde(rename_all = "camelCase")]
pub struct RunRow {
    #[ts(type = "number")]
    pub id: i64,
    pub source: String,
    pub status: RunStatus,
    #[ts(type = "number")]
    pub total_leads: i64,
    #[ts(type = "string")]
    pub started_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
}

type RunTuple = (i64, String, String, i64, i64, Option<i64>);

impl From<RunTuple> for RunRow {
    fn from((id, source, status, total_leads, started_at, completed_at): RunTuple) -> Self {
        Self {
            id,
            source,
            status: RunStatus::parse(&status),
            total_leads,
            started_at: from_unix(started_at),
            completed_at: completed_at.map(from_unix),
        }
    }
}

impl Database {
    /// Insert a run in `running` state. Returns the new run id.
    pub async fn create_run(&self, source: Source) -> DbResult<i64> {
        let result = sqlx::query("INSERT INTO runs (source, status, started_at) VALUES (?, ?, ?)")
            .bind(source.key())
            .bind(RunStatus::Running.as_str())
            .bind(Utc::now().timestamp())
            .execute(self.pool())
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Close a run. Returns false when no run has that id.
    pub async fn finish_run(&self, run_id: i64, status: RunStatus, total: u64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE runs SET status = ?, total_leads = ?, completed_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(total as i64)
        .bind(Utc::now().timestamp())
        .bind(run_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Most recent runs first.
    pub async fn recent_runs(&self, limit: i64) -> DbResult<Vec<RunRow>> {
        let rows: Vec<RunTuple> = sqlx::query_as(
            "SELECT id, source, status, total_leads, started_at, completed_at
             FROM runs ORDER BY started_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(RunRow::from).collect())
    }
}
