// crates/server/src/state.rs
//! Application state for the Axum server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use scrape_hub_core::{
    ExtractError, Extractor, HechosEsencialesExtractor, LeadStore, SeiaExtractor, Source,
};
use scrape_hub_db::Database;
use scrape_hub_server_jobs::JobRegistry;

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Read side for runs, leads and status changes.
    pub db: Database,
    /// Write side used by scrape jobs.
    pub store: Arc<dyn LeadStore>,
    /// One job key per source.
    pub jobs: Arc<JobRegistry>,
    pub extractors: BTreeMap<Source, Arc<dyn Extractor>>,
    /// Expected `X-API-Key`. `None` disables auth.
    pub api_secret: Option<String>,
}

impl AppState {
    /// Production state: SQLite store and the real extractors.
    pub fn new(db: Database, config: &ServerConfig) -> Result<Arc<Self>, ExtractError> {
        let extractors: Vec<Arc<dyn Extractor>> = vec![
            Arc::new(SeiaExtractor::new(config.seia_config())?),
            Arc::new(HechosEsencialesExtractor::new()),
        ];
        let store: Arc<dyn LeadStore> = Arc::new(db.clone());
        let jobs = Arc::new(JobRegistry::new(config.registry_config()));
        Ok(Self::from_parts(db, store, extractors, jobs, config.api_secret.clone()))
    }

    /// Assemble state from explicit collaborators.
    pub fn from_parts(
        db: Database,
        store: Arc<dyn LeadStore>,
        extractors: Vec<Arc<dyn Extractor>>,
        jobs: Arc<JobRegistry>,
        api_secret: Option<String>,
    ) -> Arc<Self> {
        let extractors = extractors.into_iter().map(|e| (e.source(), e)).collect();
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            store,
            jobs,
            extractors,
            api_secret,
        })
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Resolve a path segment to a configured source.
    pub fn extractor(&self, key: &str) -> ApiResult<(Source, Arc<dyn Extractor>)> {
        let source: Source = key
            .parse()
            .map_err(|_| ApiError::SourceNotFound(key.to_string()))?;
        let extractor = self
            .extractors
            .get(&source)
            .ok_or_else(|| ApiError::SourceNotFound(key.to_string()))?;
        Ok((source, Arc::clone(extractor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_registers_every_source() {
        let db = Database::new_in_memory().await.unwrap();
        let state = AppState::new(db, &ServerConfig::default()).unwrap();

        let keys: Vec<Source> = state.extractors.keys().copied().collect();
        assert_eq!(keys, Source::ALL.to_vec());
        assert!(state.extractor("seia").is_ok());
        assert!(matches!(state.extractor("cmf"), Err(ApiError::SourceNotFound(_))));
        assert!(state.uptime_secs() < 5);
    }
}
