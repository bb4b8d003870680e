//! Status changes detected when a re-scraped lead reports a new status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::from_unix;
use crate::{Database, DbResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRow {
    #[ts(type = "number")]
    pub id: i64,
    #[ts(type = "number")]
    pub lead_id: i64,
    pub external_id: String,
    pub project_name: String,
    pub previous_status: String,
    pub new_status: String,
    #[ts(type = "string")]
    pub detected_at: DateTime<Utc>,
    pub seen: bool,
    /// New status reads as an approval.
    pub is_approved: bool,
}

type StatusChangeTuple = (i64, i64, String, String, String, String, i64, bool);

impl From<StatusChangeTuple> for StatusChangeRow {
    fn from(t: StatusChangeTuple) -> Self {
        let (id, lead_id, external_id, project_name, previous_status, new_status, detected_at, seen) = t;
        let is_approved = new_status.to_lowercase().contains("aprobado");
        Self {
            id,
            lead_id,
            external_id,
            project_name,
            previous_status,
            new_status,
            detected_at: from_unix(detected_at),
            seen,
            is_approved,
        }
    }
}

impl Database {
    /// Most recent changes first.
    pub async fn recent_status_changes(&self, limit: i64) -> DbResult<Vec<StatusChangeRow>> {
        let rows: Vec<StatusChangeTuple> = sqlx::query_as(
            "SELECT id, lead_id, external_id, project_name, previous_status, new_status, detected_at, seen
             FROM status_changes ORDER BY detected_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(StatusChangeRow::from).collect())
    }

    /// Mark changes as seen. Unknown ids are ignored. Returns rows updated.
    pub async fn mark_status_changes_seen(&self, ids: &[i64]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("UPDATE status_changes SET seen = 1 WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.execute(self.pool()).await?;
        Ok(result.rows_affected())
    }
}
