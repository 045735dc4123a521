//! Bounded-concurrency detail fetches.

use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, warn};

use crate::pipeline::guard::NetworkGuard;
use crate::traits::adapter::SourceAdapter;
use crate::types::job::JobId;
use crate::types::record::Record;

/// Enrich listing records with their detail pages.
///
/// Records are fetched `batch_size` at a time; a batch always runs to
/// completion and `batch_delay` separates batches. A failed or empty detail
/// drops that record only. Output keeps listing order.
pub async fn fetch_details(
    job_id: JobId,
    adapter: &dyn SourceAdapter,
    guard: &NetworkGuard<'_>,
    records: Vec<Record>,
    batch_size: usize,
    batch_delay: Duration,
) -> Vec<Record> {
    let batch_size = batch_size.max(1);
    let requested = records.len();
    let mut remaining = records.into_iter().peekable();
    let mut enriched = Vec::with_capacity(requested);

    while remaining.peek().is_some() {
        let batch: Vec<Record> = remaining.by_ref().take(batch_size).collect();

        let results = join_all(batch.into_iter().map(|record| async move {
            let label = format!("scrape_item {}", record.url);
            let result = guard.call(&label, || adapter.scrape_item(&record.url)).await;

            match result {
                Ok(Some(detail)) => Some(record.merge(detail)),
                Ok(None) => {
                    warn!(job_id = %job_id, url = %record.url, "detail page had no usable data, dropping record");
                    None
                }
                Err(e) => {
                    warn!(job_id = %job_id, url = %record.url, error = %e, "detail fetch failed, dropping record");
                    None
                }
            }
        }))
        .await;

        enriched.extend(results.into_iter().flatten());

        if remaining.peek().is_some() && !batch_delay.is_zero() {
            tokio::time::sleep(batch_delay).await;
        }
    }

    debug!(
        job_id = %job_id,
        requested,
        kept = enriched.len(),
        "detail fetch finished"
    );

    enriched
}
