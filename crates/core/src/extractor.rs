// crates/core/src/extractor.rs
//! Extractor trait: paged access to one upstream source.

use async_trait::async_trait;

use crate::error::ExtractError;
use crate::types::{Lead, Source};

/// Pages leads out of an upstream source.
///
/// Implementations:
/// - `SeiaExtractor`: SEIA public search endpoint
/// - `HechosEsencialesExtractor`: fixed sample dataset
#[async_trait]
pub trait Extractor: Send + Sync {
    fn source(&self) -> Source;

    /// Upper bound on pages fetched in one run. Drives progress percent.
    fn max_pages(&self) -> u32;

    /// Fetch page `page` (1-based). An empty page ends extraction.
    async fn fetch_page(&self, page: u32) -> Result<Vec<Lead>, ExtractError>;
}
