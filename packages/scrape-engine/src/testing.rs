//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the scrape engine
//! without making real network calls.
//!
//! Mocks share their state behind `Arc`s, so a clone handed to a
//! [`SourceRegistry`](crate::registry::SourceRegistry) factory reports its
//! calls back to the instance kept by the test.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{AdapterError, AdapterResult, ExportError, ExportResult};
use crate::traits::{adapter::SourceAdapter, exporter::Exporter};
use crate::types::record::Record;

/// A mock source adapter.
///
/// Listing pages are addressed as `<listing_url>?page=<n>`. Pages without
/// predefined records yield `items_per_page` generated records.
#[derive(Clone)]
pub struct MockAdapter {
    source_id: String,

    /// Value returned by `total_pages`
    total_pages: u32,

    /// Records generated for pages without predefined records
    items_per_page: usize,

    /// Predefined records by page number
    pages: Arc<RwLock<HashMap<u32, Vec<Record>>>>,

    /// Pages that always fail
    fail_pages: Arc<RwLock<HashSet<u32>>>,

    /// Pages whose list scrape panics
    panic_pages: Arc<RwLock<HashSet<u32>>>,

    /// Pages that fail a fixed number of times before succeeding
    flaky_pages: Arc<RwLock<HashMap<u32, u32>>>,

    /// Detail records by detail URL; `None` means "nothing usable"
    details: Arc<RwLock<HashMap<String, Option<Record>>>>,

    /// Detail URLs that always fail
    fail_details: Arc<RwLock<HashSet<String>>>,

    fetch_details: bool,
    fail_initialize: bool,
    fail_total_pages: bool,
    fail_cleanup: bool,

    /// Simulated latency of every listing fetch
    list_latency: Duration,

    /// Per-instance; factories hand out clones that start uninitialized
    initialized: bool,

    /// Call tracking
    calls: Arc<RwLock<Vec<MockAdapterCall>>>,
}

/// Record of a call made to the mock adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAdapterCall {
    Initialize,
    Cleanup,
    TotalPages { url: String },
    ScrapeList { page: u32 },
    ScrapeItem { url: String },
}

impl MockAdapter {
    /// Create a mock with one empty page.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            total_pages: 1,
            items_per_page: 0,
            pages: Default::default(),
            fail_pages: Default::default(),
            panic_pages: Default::default(),
            flaky_pages: Default::default(),
            details: Default::default(),
            fail_details: Default::default(),
            fetch_details: false,
            fail_initialize: false,
            fail_total_pages: false,
            fail_cleanup: false,
            list_latency: Duration::ZERO,
            initialized: false,
            calls: Default::default(),
        }
    }

    pub fn with_total_pages(mut self, total_pages: u32) -> Self {
        self.total_pages = total_pages;
        self
    }

    /// Generate `count` records for every page without predefined records.
    pub fn with_items_per_page(mut self, count: usize) -> Self {
        self.items_per_page = count;
        self
    }

    /// Predefine the records of one page.
    pub fn with_page(self, page: u32, records: Vec<Record>) -> Self {
        self.pages.write().unwrap().insert(page, records);
        self
    }

    /// Make a page fail on every attempt.
    pub fn fail_page(self, page: u32) -> Self {
        self.fail_pages.write().unwrap().insert(page);
        self
    }

    /// Make the list scrape of a page panic.
    pub fn panic_on_page(self, page: u32) -> Self {
        self.panic_pages.write().unwrap().insert(page);
        self
    }

    /// Make a page fail `times` times, then succeed.
    pub fn flaky_page(self, page: u32, times: u32) -> Self {
        self.flaky_pages.write().unwrap().insert(page, times);
        self
    }

    /// Enable detail fetches and predefine one detail result.
    pub fn with_detail(mut self, url: impl Into<String>, detail: Option<Record>) -> Self {
        self.fetch_details = true;
        self.details.write().unwrap().insert(url.into(), detail);
        self
    }

    /// Enable detail fetches and make one detail URL fail.
    pub fn fail_detail(mut self, url: impl Into<String>) -> Self {
        self.fetch_details = true;
        self.fail_details.write().unwrap().insert(url.into());
        self
    }

    /// Enable detail fetches. Unknown detail URLs echo the listing URL back.
    pub fn with_details(mut self) -> Self {
        self.fetch_details = true;
        self
    }

    pub fn fail_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn fail_total_pages(mut self) -> Self {
        self.fail_total_pages = true;
        self
    }

    pub fn fail_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    pub fn with_list_latency(mut self, latency: Duration) -> Self {
        self.list_latency = latency;
        self
    }

    /// Get all calls made to this mock (and its clones).
    pub fn calls(&self) -> Vec<MockAdapterCall> {
        self.calls.read().unwrap().clone()
    }

    /// Listing pages requested, in order, with retries collapsed.
    pub fn pages_visited(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MockAdapterCall::ScrapeList { page } => Some(page),
                _ => None,
            })
            .collect();
        pages.dedup();
        pages
    }

    /// Number of calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&MockAdapterCall) -> bool) -> usize {
        self.calls.read().unwrap().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: MockAdapterCall) {
        self.calls.write().unwrap().push(call);
    }

    fn generated_records(&self, page_url: &str, page: u32) -> Vec<Record> {
        let base = page_url.split('?').next().unwrap_or(page_url);
        (1..=self.items_per_page)
            .map(|i| {
                Record::new(format!("{}/item-{}-{}", base, page, i), &self.source_id)
                    .with_field("page", page)
            })
            .collect()
    }
}

fn refused(url: &str) -> AdapterError {
    AdapterError::Http(Box::new(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        format!("Mock connection refused: {}", url),
    )))
}

fn page_number(page_url: &str) -> AdapterResult<u32> {
    page_url
        .rsplit_once("page=")
        .and_then(|(_, n)| n.parse().ok())
        .ok_or_else(|| AdapterError::InvalidUrl {
            url: page_url.to_string(),
        })
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn initialize(&mut self) -> AdapterResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.record(MockAdapterCall::Initialize);

        if self.fail_initialize {
            return Err(AdapterError::Initialize("mock browser failed to launch".into()));
        }

        self.initialized = true;
        Ok(())
    }

    async fn cleanup(&mut self) -> AdapterResult<()> {
        self.record(MockAdapterCall::Cleanup);
        self.initialized = false;

        if self.fail_cleanup {
            return Err(AdapterError::Cleanup("mock browser refused to close".into()));
        }
        Ok(())
    }

    async fn total_pages(&self, listing_url: &str) -> AdapterResult<u32> {
        self.record(MockAdapterCall::TotalPages {
            url: listing_url.to_string(),
        });

        if self.fail_total_pages {
            return Err(refused(listing_url));
        }
        Ok(self.total_pages)
    }

    fn page_url(&self, listing_url: &str, page: u32) -> String {
        format!("{}?page={}", listing_url, page)
    }

    async fn scrape_list(&self, page_url: &str) -> AdapterResult<Vec<Record>> {
        let page = page_number(page_url)?;
        self.record(MockAdapterCall::ScrapeList { page });

        if !self.list_latency.is_zero() {
            tokio::time::sleep(self.list_latency).await;
        }

        if self.panic_pages.read().unwrap().contains(&page) {
            panic!("mock adapter panicked on page {}", page);
        }

        if self.fail_pages.read().unwrap().contains(&page) {
            return Err(refused(page_url));
        }

        {
            let mut flaky = self.flaky_pages.write().unwrap();
            if let Some(remaining) = flaky.get_mut(&page) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(refused(page_url));
                }
            }
        }

        let predefined = self.pages.read().unwrap().get(&page).cloned();
        Ok(predefined.unwrap_or_else(|| self.generated_records(page_url, page)))
    }

    async fn scrape_item(&self, detail_url: &str) -> AdapterResult<Option<Record>> {
        self.record(MockAdapterCall::ScrapeItem {
            url: detail_url.to_string(),
        });

        if self.fail_details.read().unwrap().contains(detail_url) {
            return Err(refused(detail_url));
        }

        let detail = self.details.read().unwrap().get(detail_url).cloned();
        Ok(detail.unwrap_or_else(|| {
            Some(Record::new(detail_url, &self.source_id).with_field("detailed", true))
        }))
    }

    fn fetches_details(&self) -> bool {
        self.fetch_details
    }
}

/// A mock exporter that records every batch it receives.
#[derive(Clone, Default)]
pub struct MockExporter {
    fail: bool,
    batches: Arc<RwLock<Vec<Vec<Record>>>>,
}

impl MockExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// An exporter whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of export calls received.
    pub fn calls(&self) -> usize {
        self.batches.read().unwrap().len()
    }

    /// Every batch received, in order.
    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.read().unwrap().clone()
    }

    /// All records received across batches.
    pub fn records(&self) -> Vec<Record> {
        self.batches.read().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl Exporter for MockExporter {
    fn exporter_type(&self) -> &str {
        "mock"
    }

    async fn export_records(&self, records: &[Record]) -> ExportResult<Vec<String>> {
        self.batches.write().unwrap().push(records.to_vec());

        if self.fail {
            return Err(ExportError::Rejected {
                destination: "mock".into(),
                reason: "mock destination unavailable".into(),
            });
        }

        Ok(records.iter().map(|r| r.key().to_string()).collect())
    }
}
