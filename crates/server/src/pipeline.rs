//! The scrape job: page through a source and persist every page.
//!
//! Each page is one step. Before a step the job checks for cancellation,
//! then fetches, then persists; progress is reported after the fetch starts
//! and after the page is saved. A run row brackets the whole job and is
//! closed with the outcome even when the job fails, is cancelled or runs
//! past the registry's runtime limit.

use std::sync::Arc;

use scrape_hub_core::{Extractor, LeadStore, RunStatus, SaveSummary};
use scrape_hub_server_jobs::{JobCompletion, JobContext, JobError};

#[derive(Debug, Default)]
struct Tally {
    summary: SaveSummary,
    pages: u64,
}

/// Percent for `done` of `total` pages. 100 is reserved for completion.
fn page_percent(done: u32, total: u32) -> u8 {
    let total = u64::from(total.max(1));
    ((u64::from(done) * 100) / total).min(99) as u8
}

/// Run one scrape of `extractor`'s source into `store`.
pub async fn run_scrape(
    ctx: JobContext,
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn LeadStore>,
) -> Result<JobCompletion, JobError> {
    let source = extractor.source();
    let run_id = store
        .create_run(source)
        .await
        .map_err(|e| JobError::failed(format!("failed to record run: {e:#}")))?;
    tracing::info!(source = %source, run_id, "Scrape run started");

    let mut tally = Tally::default();
    let outcome = scrape_pages(&ctx, extractor.as_ref(), store.as_ref(), &mut tally).await;

    let status = match &outcome {
        Ok(()) => RunStatus::Completed,
        Err(JobError::Cancelled) if ctx.is_deadline_exceeded() => RunStatus::Error,
        Err(JobError::Cancelled) => RunStatus::Cancelled,
        Err(JobError::Failed(_)) => RunStatus::Error,
    };
    let saved = tally.summary.saved();
    if let Err(e) = store.finish_run(run_id, status, saved).await {
        tracing::warn!(source = %source, run_id, error = %e, "Failed to close run");
        if outcome.is_ok() {
            return Err(JobError::failed(format!("failed to close run: {e:#}")));
        }
    }
    outcome?;

    ctx.report(
        100,
        format!("Saved {saved} leads ({} new, {} updated)", tally.summary.inserted, tally.summary.updated),
    );
    Ok(JobCompletion::new(saved)
        .with_metric("inserted", tally.summary.inserted)
        .with_metric("updated", tally.summary.updated)
        .with_metric("status_changes", tally.summary.status_changes)
        .with_metric("pages", tally.pages))
}

async fn scrape_pages(
    ctx: &JobContext,
    extractor: &dyn Extractor,
    store: &dyn LeadStore,
    tally: &mut Tally,
) -> Result<(), JobError> {
    let source = extractor.source();
    let max_pages = extractor.max_pages().max(1);

    for page in 1..=max_pages {
        ctx.checkpoint()?;
        ctx.report(
            page_percent(page - 1, max_pages),
            format!("Fetching page {page} of {max_pages}"),
        );

        let leads = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(JobError::Cancelled),
            fetched = extractor.fetch_page(page) => {
                fetched.map_err(|e| JobError::failed(format!("{} page {page}: {e}", source.label())))?
            }
        };
        if leads.is_empty() {
            tracing::debug!(source = %source, page, "Empty page, stopping");
            break;
        }

        let saved = store
            .save_leads(source, &leads)
            .await
            .map_err(|e| JobError::failed(format!("failed to save leads: {e:#}")))?;
        tally.summary.merge(saved);
        tally.pages += 1;

        ctx.report(
            page_percent(page, max_pages),
            format!("Saved page {page} of {max_pages} ({} leads so far)", tally.summary.saved()),
        );
    }
    Ok(())
}
