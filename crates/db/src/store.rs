//! `LeadStore` implementation backed by SQLite.

use async_trait::async_trait;
use scrape_hub_core::{Lead, LeadStore, RunStatus, SaveSummary, Source};

use crate::Database;

#[async_trait]
impl LeadStore for Database {
    async fn create_run(&self, source: Source) -> anyhow::Result<i64> {
        Ok(Database::create_run(self, source).await?)
    }

    async fn save_leads(&self, source: Source, leads: &[Lead]) -> anyhow::Result<SaveSummary> {
        Ok(Database::save_leads(self, source, leads).await?)
    }

    async fn finish_run(&self, run_id: i64, status: RunStatus, total: u64) -> anyhow::Result<()> {
        if !Database::finish_run(self, run_id, status, total).await? {
            tracing::warn!(run_id, "Finished a run that does not exist");
        }
        Ok(())
    }
}
