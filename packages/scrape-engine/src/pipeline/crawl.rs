//! Paginated crawl loop for one job.
//!
//! ```text
//! total_pages ─► for page in start..=min(total, start + limit - 1)
//!                  ├─ scrape_list (guarded)
//!                  ├─ detail batches (optional)
//!                  ├─ persist progress
//!                  ├─ fan out to destinations
//!                  └─ page delay (not after the last page)
//! ```
//!
//! A failing page is logged and skipped. Only total-page discovery can fail
//! the crawl as a whole.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AdapterError;
use crate::exporters::fanout::fan_out;
use crate::limiter::RateLimiter;
use crate::pipeline::details::fetch_details;
use crate::pipeline::guard::NetworkGuard;
use crate::retry::RetryError;
use crate::traits::{adapter::SourceAdapter, exporter::Exporter, store::JobStore};
use crate::types::config::OrchestratorConfig;
use crate::types::job::{JobConfig, JobError, JobErrorKind, JobId, JobUpdate};
use crate::types::record::Record;

/// What a finished crawl loop did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Page count reported by the adapter (clamped to at least 1)
    pub total_pages: u32,

    /// Pages whose records were exported
    pub pages_crawled: u32,

    /// Pages skipped after exhausting retries
    pub pages_failed: u32,

    /// Records found across all crawled pages
    pub items: u64,

    /// The loop stopped early on the cancellation signal
    pub cancelled: bool,
}

/// One job's crawl loop.
pub struct Crawl<'a> {
    job_id: JobId,
    config: &'a OrchestratorConfig,
    guard: NetworkGuard<'a>,
    store: &'a dyn JobStore,
    destinations: &'a [(String, Arc<dyn Exporter>)],
    cancel: &'a CancellationToken,
    items: AtomicU64,
}

impl<'a> Crawl<'a> {
    pub fn new(
        job_id: JobId,
        config: &'a OrchestratorConfig,
        limiter: &'a RateLimiter,
        store: &'a dyn JobStore,
        destinations: &'a [(String, Arc<dyn Exporter>)],
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            job_id,
            config,
            guard: NetworkGuard::new(config, limiter),
            store,
            destinations,
            cancel,
            items: AtomicU64::new(0),
        }
    }

    /// Records counted so far.
    ///
    /// Still readable when the `run` future was dropped by a deadline.
    pub fn items_found(&self) -> u64 {
        self.items.load(Ordering::SeqCst)
    }

    /// Walk the requested page range.
    ///
    /// Returns the captured error only when the page count cannot be
    /// discovered.
    pub async fn run(
        &self,
        adapter: &dyn SourceAdapter,
        request: &JobConfig,
    ) -> std::result::Result<CrawlSummary, JobError> {
        let job_id = self.job_id;

        let discovered = self
            .guard
            .call("total_pages", || adapter.total_pages(&request.url))
            .await
            .map_err(|e| {
                error!(job_id = %job_id, url = %request.url, error = %e, "page discovery failed");
                JobError::new(JobErrorKind::PageDiscovery, e.to_string())
            })?;

        let total_pages = if discovered == 0 {
            warn!(job_id = %job_id, "adapter reported 0 pages, treating as 1");
            1
        } else {
            discovered
        };

        let mut summary = CrawlSummary {
            total_pages,
            ..Default::default()
        };

        let start = request.start.max(1);
        let last = total_pages.min(start.saturating_add(request.limit.saturating_sub(1)));

        if start > last {
            info!(
                job_id = %job_id,
                start,
                total_pages,
                "start page is past the last page, nothing to crawl"
            );
            return Ok(summary);
        }

        info!(job_id = %job_id, total_pages, start, last, "crawling pages");

        for page in start..=last {
            if self.cancel.is_cancelled() {
                info!(job_id = %job_id, page, "cancelled before page");
                summary.cancelled = true;
                return Ok(summary);
            }

            let page_url = adapter.page_url(&request.url, page);

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(job_id = %job_id, page, "cancelled during page");
                    summary.cancelled = true;
                    return Ok(summary);
                }
                result = self.scrape_page(adapter, &page_url) => result,
            };

            match result {
                Ok(records) => {
                    summary.pages_crawled += 1;
                    summary.items += records.len() as u64;
                    self.items.store(summary.items, Ordering::SeqCst);

                    debug!(
                        job_id = %job_id,
                        page,
                        count = records.len(),
                        total = summary.items,
                        "page scraped"
                    );

                    self.persist_progress(summary.items).await;

                    let report = fan_out(job_id, &records, self.destinations).await;
                    if !report.is_clean() {
                        warn!(
                            job_id = %job_id,
                            page,
                            failed = ?report.failed(),
                            "some destinations rejected the page"
                        );
                    }
                }
                Err(e) => {
                    summary.pages_failed += 1;
                    error!(
                        job_id = %job_id,
                        page,
                        url = %page_url,
                        error = %e,
                        "page failed, skipping"
                    );
                }
            }

            if page < last {
                self.pause(self.config.page_delay).await;
            }
        }

        info!(
            job_id = %job_id,
            pages_crawled = summary.pages_crawled,
            pages_failed = summary.pages_failed,
            items = summary.items,
            "crawl finished"
        );

        Ok(summary)
    }

    async fn scrape_page(
        &self,
        adapter: &dyn SourceAdapter,
        page_url: &str,
    ) -> std::result::Result<Vec<Record>, RetryError<AdapterError>> {
        let label = format!("scrape_list {}", page_url);
        let records = self
            .guard
            .call(&label, || adapter.scrape_list(page_url))
            .await?;

        if !adapter.fetches_details() || records.is_empty() {
            return Ok(records);
        }

        Ok(fetch_details(
            self.job_id,
            adapter,
            &self.guard,
            records,
            self.config.item_batch_size,
            self.config.item_batch_delay,
        )
        .await)
    }

    async fn persist_progress(&self, items: u64) {
        if let Err(e) = self.store.update(self.job_id, JobUpdate::progress(items)).await {
            warn!(job_id = %self.job_id, error = %e, "failed to persist progress");
        }
    }

    /// Sleep unless cancelled first.
    async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::RateLimitConfig;
    use crate::retry::RetryPolicy;
    use crate::stores::MemoryJobStore;
    use crate::testing::{MockAdapter, MockAdapterCall, MockExporter};
    use crate::types::job::JobStatus;
    use tokio::time::Instant;

    struct Harness {
        config: OrchestratorConfig,
        limiter: RateLimiter,
        store: MemoryJobStore,
        exporter: MockExporter,
        destinations: Vec<(String, Arc<dyn Exporter>)>,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            let config = OrchestratorConfig::new()
                .with_rate_limit(RateLimitConfig::unlimited())
                .with_page_delay(Duration::from_secs(2));
            let exporter = MockExporter::new();
            Self {
                limiter: RateLimiter::new(config.rate_limit),
                config,
                store: MemoryJobStore::new(),
                destinations: vec![("mock".to_string(), Arc::new(exporter.clone()) as Arc<dyn Exporter>)],
                exporter,
                cancel: CancellationToken::new(),
            }
        }

        async fn run(&self, adapter: &MockAdapter, request: &JobConfig) -> (CrawlSummary, u64) {
            let job_id = self
                .store
                .create("mock", JobStatus::Running, request)
                .await
                .unwrap();
            let crawl = Crawl::new(
                job_id,
                &self.config,
                &self.limiter,
                &self.store,
                &self.destinations,
                &self.cancel,
            );
            let summary = crawl.run(adapter, request).await.unwrap();
            let job = self.store.get(job_id).await.unwrap().unwrap();
            (summary, job.items_found)
        }
    }

    fn request(start: u32, limit: u32) -> JobConfig {
        JobConfig::new("https://example.com/list").with_pages(start, limit)
    }

    #[tokio::test(start_paused = true)]
    async fn test_visits_requested_window_in_order() {
        let harness = Harness::new();
        let adapter = MockAdapter::new("mock").with_total_pages(5).with_items_per_page(2);

        let (summary, persisted) = harness.run(&adapter, &request(2, 2)).await;

        assert_eq!(adapter.pages_visited(), vec![2, 3]);
        assert_eq!(summary.pages_crawled, 2);
        assert_eq!(summary.items, 4);
        assert_eq!(persisted, 4);
        assert_eq!(harness.exporter.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_past_last_page_is_clamped() {
        let harness = Harness::new();
        let adapter = MockAdapter::new("mock").with_total_pages(3).with_items_per_page(1);

        let (summary, _) = harness.run(&adapter, &request(2, 10)).await;

        assert_eq!(adapter.pages_visited(), vec![2, 3]);
        assert_eq!(summary.items, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_past_total_pages_visits_nothing() {
        let harness = Harness::new();
        let adapter = MockAdapter::new("mock").with_total_pages(3).with_items_per_page(1);

        let (summary, persisted) = harness.run(&adapter, &request(4, 2)).await;

        assert!(adapter.pages_visited().is_empty());
        assert_eq!(summary.items, 0);
        assert_eq!(persisted, 0);
        assert_eq!(harness.exporter.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_total_pages_is_treated_as_one() {
        let harness = Harness::new();
        let adapter = MockAdapter::new("mock").with_total_pages(0).with_items_per_page(1);

        let (summary, _) = harness.run(&adapter, &request(1, 5)).await;

        assert_eq!(summary.total_pages, 1);
        assert_eq!(adapter.pages_visited(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_page_is_skipped() {
        let harness = Harness::new();
        let adapter = MockAdapter::new("mock")
            .with_total_pages(3)
            .with_items_per_page(2)
            .fail_page(2);

        let (summary, persisted) = harness.run(&adapter, &request(1, 3)).await;

        assert_eq!(adapter.pages_visited(), vec![1, 2, 3]);
        assert_eq!(
            adapter.count_calls(|c| *c == MockAdapterCall::ScrapeList { page: 2 }),
            3
        );
        assert_eq!(summary.pages_crawled, 2);
        assert_eq!(summary.pages_failed, 1);
        assert_eq!(persisted, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_delay_only_between_pages() {
        let harness = Harness::new();
        let adapter = MockAdapter::new("mock").with_total_pages(3).with_items_per_page(1);

        let started = Instant::now();
        harness.run(&adapter, &request(1, 3)).await;

        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_failure_attempts_no_pages() {
        let mut harness = Harness::new();
        harness.config = harness.config.clone().with_retry(RetryPolicy::default());
        let adapter = MockAdapter::new("mock").with_total_pages(3).fail_total_pages();
        let request = request(1, 3);

        let job_id = harness
            .store
            .create("mock", JobStatus::Running, &request)
            .await
            .unwrap();
        let crawl = Crawl::new(
            job_id,
            &harness.config,
            &harness.limiter,
            &harness.store,
            &harness.destinations,
            &harness.cancel,
        );
        let error = crawl.run(&adapter, &request).await.unwrap_err();

        assert_eq!(error.kind, JobErrorKind::PageDiscovery);
        assert!(error.message.contains("total_pages"));
        assert_eq!(
            adapter.count_calls(|c| matches!(c, MockAdapterCall::TotalPages { .. })),
            3
        );
        assert!(adapter.pages_visited().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_before_next_page() {
        let harness = Harness::new();
        let adapter = MockAdapter::new("mock").with_total_pages(5).with_items_per_page(1);
        let cancel = harness.cancel.clone();

        let req = request(1, 5);
        let run = harness.run(&adapter, &req);
        let trigger = async {
            // Lands inside the delay after page 1.
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        };
        let ((summary, persisted), ()) = tokio::join!(run, trigger);

        assert!(summary.cancelled);
        assert_eq!(adapter.pages_visited(), vec![1]);
        assert_eq!(persisted, 1);
    }
}
