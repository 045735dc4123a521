//! Source adapter trait.

use async_trait::async_trait;

use crate::error::AdapterResult;
use crate::types::record::Record;

/// Knows how to fetch and parse pages from one external source.
///
/// The orchestrator obtains a fresh instance per job from the
/// [`SourceRegistry`](crate::registry::SourceRegistry), so implementations may
/// hold per-job mutable state (sessions, browser contexts) without locking.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier of the source this adapter serves.
    fn source_id(&self) -> &str;

    /// Acquire resources. Calling it twice on one instance is a no-op.
    async fn initialize(&mut self) -> AdapterResult<()>;

    /// Release resources. Always called once the job is done with the adapter.
    async fn cleanup(&mut self) -> AdapterResult<()>;

    /// Number of listing pages behind `listing_url` (at least 1).
    ///
    /// Implementations should fall back to 1 when the count cannot be
    /// extracted, and only return an error when the listing cannot be reached.
    async fn total_pages(&self, listing_url: &str) -> AdapterResult<u32>;

    /// URL of listing page `page` (1-based).
    fn page_url(&self, listing_url: &str, page: u32) -> String;

    /// Records found on one listing page.
    async fn scrape_list(&self, page_url: &str) -> AdapterResult<Vec<Record>>;

    /// Full record behind one detail URL, or `None` when the page holds nothing usable.
    async fn scrape_item(&self, _detail_url: &str) -> AdapterResult<Option<Record>> {
        Ok(None)
    }

    /// Whether listing records should be enriched through [`scrape_item`](Self::scrape_item).
    fn fetches_details(&self) -> bool {
        false
    }
}
