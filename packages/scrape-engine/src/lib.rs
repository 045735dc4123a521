//! Paginated Scrape Job Orchestration
//!
//! Runs long-lived, paginated collection jobs against external sources and
//! fans the collected records out to several destinations. Partial failure is
//! tolerated at every stage: a bad page is skipped, a bad detail drops one
//! record, a failing destination is logged. Only adapter initialization,
//! page discovery and the job deadline can fail a job.
//!
//! # Usage
//!
//! ```rust,ignore
//! use scrape_engine::{
//!     ExporterRegistry, JobConfig, MemoryJobStore, Orchestrator, OrchestratorConfig,
//!     ScrapeRequest, SourceRegistry,
//! };
//! use scrape_engine::exporters::MemoryExporter;
//!
//! let sources = SourceRegistry::new().with("listings", || Box::new(MyAdapter::new()));
//! let exporters = ExporterRegistry::new().with("memory", Arc::new(MemoryExporter::new()));
//! let orchestrator = Orchestrator::new(
//!     Arc::new(MemoryJobStore::new()),
//!     sources,
//!     exporters,
//!     OrchestratorConfig::default(),
//! );
//!
//! let request = ScrapeRequest::new(
//!     "listings",
//!     JobConfig::new("https://example.com/search")
//!         .with_exporters(["memory"])
//!         .with_pages(1, 5),
//! );
//! let job_id = orchestrator.submit(request).await?;
//! let job = orchestrator.wait(job_id).await?;
//! ```
//!
//! # Modules
//!
//! - [`orchestrator`] - Job lifecycle, running-job table, cancellation
//! - [`pipeline`] - Crawl loop, detail batching, network guard
//! - [`retry`] - Retry executor with capped exponential backoff
//! - [`limiter`] - Process-wide sliding-window rate limiter
//! - [`registry`] - Source and exporter registries
//! - [`exporters`] - Destinations and the fan-out dispatcher
//! - [`stores`] - Job store implementations
//! - [`adapters`] - Selector-driven HTML adapter
//! - [`testing`] - Mock implementations for testing

pub mod adapters;
pub mod error;
pub mod exporters;
pub mod limiter;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{AdapterError, EngineError, ExportError, Result, StoreError};
pub use exporters::{fan_out, DestinationOutcome, FanoutReport};
pub use limiter::{RateLimitConfig, RateLimiter};
pub use orchestrator::{Orchestrator, ScrapeRequest};
pub use registry::{ExporterRegistry, SourceFactory, SourceRegistry};
pub use retry::{with_retry, RetryError, RetryPolicy};
pub use stores::MemoryJobStore;
pub use traits::{adapter::SourceAdapter, exporter::Exporter, store::JobStore};
pub use types::{
    config::OrchestratorConfig,
    job::{Job, JobConfig, JobError, JobErrorKind, JobId, JobStats, JobStatus, JobUpdate},
    record::Record,
};

#[cfg(feature = "sqlite")]
pub use stores::SqliteJobStore;
