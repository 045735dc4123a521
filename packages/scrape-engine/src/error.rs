//! Typed errors for the scrape engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match on
//! the failure class: submission problems, adapter failures, exporter failures
//! and storage failures are kept apart.

use thiserror::Error;

use crate::types::job::{JobId, JobStatus};

/// Errors surfaced by the orchestrator's public API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No adapter factory registered for this source id
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// No exporter registered for this destination id
    #[error("unknown exporter: {0}")]
    UnknownExporter(String),

    /// Request rejected before a job was created
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Job id not present in the store
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Errors raised by a source adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Resources could not be acquired
    #[error("adapter initialization failed: {0}")]
    Initialize(String),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Unexpected HTTP status
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    /// Page content could not be turned into records
    #[error("extraction failed for {url}: {reason}")]
    Extraction { url: String, reason: String },

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Operation exceeded its timeout
    #[error("timeout after {elapsed_ms}ms: {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    /// Resources could not be released
    #[error("cleanup failed: {0}")]
    Cleanup(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        AdapterError::Http(Box::new(e))
    }
}

/// Errors raised by an exporter.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Destination backend rejected the write
    #[error("export to {destination} failed: {reason}")]
    Rejected { destination: String, reason: String },

    /// File I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database write failed
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by a job store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failed
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A persisted row could not be decoded
    #[error("corrupt job row {id}: {reason}")]
    Corrupt { id: String, reason: String },

    /// Update targeted a job that does not exist
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Lifecycle rule violated
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(Box::new(e))
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for ExportError {
    fn from(e: sqlx::Error) -> Self {
        ExportError::Database(Box::new(e))
    }
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Result type alias for exporter operations.
pub type ExportResult<T> = std::result::Result<T, ExportError>;

/// Result type alias for job store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
