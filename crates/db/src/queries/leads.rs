//! Lead persistence with dedupe and status-change detection.

use chrono::{DateTime, Utc};
use scrape_hub_core::{Lead, SaveSummary, Source};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::from_unix;
use crate::{Database, DbResult};

/// A stored lead as served to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
#[serde(rename_all = "camelCase")]
pub struct LeadRow {
    #[ts(type = "number")]
    pub id: i64,
    pub source: String,
    pub project_name: String,
    pub date: String,
    pub sector: String,
    pub description: String,
    pub external_id: Option<String>,
    pub status: Option<String>,
    #[ts(type = "Record<string, unknown>")]
    pub raw_data: serde_json::Value,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

type LeadTuple = (
    i64,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    i64,
    i64,
);

impl From<LeadTuple> for LeadRow {
    fn from(t: LeadTuple) -> Self {
        let (id, source, project_name, date, sector, description, external_id, status, raw, created_at, updated_at) = t;
        Self {
            id,
            source,
            project_name,
            date,
            sector,
            description,
            external_id,
            status,
            raw_data: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
            created_at: from_unix(created_at),
            updated_at: from_unix(updated_at),
        }
    }
}

const LEAD_COLUMNS: &str = "id, source, project_name, date, sector, description, external_id, status, raw_data, created_at, updated_at";

impl Database {
    /// Persist one page of leads in a single transaction.
    ///
    /// A lead matches a stored one by `(source, external_id)`, or by
    /// `(source, project_name)` when it has no external id. Matches are
    /// refreshed in place instead of duplicated. When a matched lead's
    /// known status changes, a status-change row is recorded.
    pub async fn save_leads(&self, source: Source, leads: &[Lead]) -> DbResult<SaveSummary> {
        let now = Utc::now().timestamp();
        let mut summary = SaveSummary::default();
        let mut tx = self.pool().begin().await?;

        for lead in leads {
            let raw = serde_json::to_string(&lead.raw_data)?;

            let existing: Option<(i64, Option<String>)> = match &lead.external_id {
                Some(external_id) => {
                    sqlx::query_as("SELECT id, status FROM leads WHERE source = ? AND external_id = ?")
                        .bind(source.key())
                        .bind(external_id)
                        .fetch_optional(&mut *tx)
                        .await?
                }
                None => {
                    sqlx::query_as(
                        "SELECT id, status FROM leads
                         WHERE source = ? AND external_id IS NULL AND project_name = ?
                         ORDER BY id LIMIT 1",
                    )
                    .bind(source.key())
                    .bind(&lead.project_name)
                    .fetch_optional(&mut *tx)
                    .await?
                }
            };

            let Some((lead_id, previous_status)) = existing else {
                sqlx::query(
                    "INSERT INTO leads (source, project_name, date, sector, description, external_id, status, raw_data, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(source.key())
                .bind(&lead.project_name)
                .bind(&lead.date)
                .bind(&lead.sector)
                .bind(&lead.description)
                .bind(&lead.external_id)
                .bind(&lead.status)
                .bind(&raw)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                summary.inserted += 1;
                continue;
            };

            sqlx::query(
                "UPDATE leads SET project_name = ?, date = ?, sector = ?, description = ?,
                        status = COALESCE(?, status), raw_data = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(&lead.project_name)
            .bind(&lead.date)
            .bind(&lead.sector)
            .bind(&lead.description)
            .bind(&lead.status)
            .bind(&raw)
            .bind(now)
            .bind(lead_id)
            .execute(&mut *tx)
            .await?;
            summary.updated += 1;

            // Only a change between two known statuses counts.
            let change = match (previous_status, &lead.status, &lead.external_id) {
                (Some(previous), Some(new), Some(external_id))
                    if !previous.is_empty() && previous != *new =>
                {
                    Some((previous, new, external_id))
                }
                _ => None,
            };
            if let Some((previous, new, external_id)) = change {
                sqlx::query(
                    "INSERT INTO status_changes (lead_id, external_id, project_name, previous_status, new_status, detected_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(lead_id)
                .bind(external_id)
                .bind(&lead.project_name)
                .bind(&previous)
                .bind(new)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                summary.status_changes += 1;
                tracing::info!(
                    source = %source,
                    external_id = %external_id,
                    from = %previous,
                    to = %new,
                    "Lead status changed"
                );
            }
        }

        tx.commit().await?;
        Ok(summary)
    }

    /// Most recently created leads, optionally for one source.
    pub async fn latest_leads(&self, limit: i64, source: Option<Source>) -> DbResult<Vec<LeadRow>> {
        let rows: Vec<LeadTuple> = match source {
            Some(source) => {
                sqlx::query_as(&format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE source = ?
                     ORDER BY created_at DESC, id DESC LIMIT ?"
                ))
                .bind(source.key())
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at DESC, id DESC LIMIT ?"
                ))
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows.into_iter().map(LeadRow::from).collect())
    }
}
