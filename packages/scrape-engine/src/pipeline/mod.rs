//! The crawl pipeline: paginated traversal, detail batching and the guard
//! every adapter network call passes through.
//!
//! - [`guard`] - rate-limit permit, per-operation timeout and retry around one call
//! - [`details`] - bounded-concurrency detail fetches
//! - [`crawl`] - the page loop for one job

pub mod crawl;
pub mod details;
pub mod guard;

pub use crawl::{Crawl, CrawlSummary};
pub use details::fetch_details;
pub use guard::NetworkGuard;
