// crates/core/src/store.rs
use async_trait::async_trait;

use crate::types::{Lead, RunStatus, SaveSummary, Source};

/// Persistence for scrape runs and their leads.
///
/// Errors are opaque to the job: any failure here ends the run as failed.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Record a new run in `running` state and return its id.
    async fn create_run(&self, source: Source) -> anyhow::Result<i64>;

    /// Persist one page of leads. Must be atomic per call.
    async fn save_leads(&self, source: Source, leads: &[Lead]) -> anyhow::Result<SaveSummary>;

    /// Close a run with its final status and lead total.
    async fn finish_run(&self, run_id: i64, status: RunStatus, total: u64) -> anyhow::Result<()>;
}
