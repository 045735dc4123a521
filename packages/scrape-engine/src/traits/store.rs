//! Job store trait.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::job::{Job, JobConfig, JobId, JobStats, JobStatus, JobUpdate};

/// Persistence for job records.
///
/// The orchestrator is the only writer. Stores never delete jobs; retention
/// is a housekeeping concern outside the engine.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job and return its id.
    async fn create(&self, source: &str, status: JobStatus, config: &JobConfig) -> StoreResult<JobId>;

    /// Apply a partial update.
    ///
    /// Implementations must keep `started_at`/`completed_at` write-once and
    /// counters non-decreasing (see [`Job::apply`]).
    async fn update(&self, id: JobId, update: JobUpdate) -> StoreResult<()>;

    /// Get a job by id.
    async fn get(&self, id: JobId) -> StoreResult<Option<Job>>;

    /// List jobs, newest first.
    async fn list(&self, status: Option<JobStatus>, limit: usize, offset: usize) -> StoreResult<Vec<Job>>;

    /// Aggregate counts by status plus record totals.
    async fn stats(&self) -> StoreResult<JobStats>;

    /// Count jobs in one status.
    async fn count_by_status(&self, status: JobStatus) -> StoreResult<u64> {
        Ok(self.stats().await?.count(status))
    }
}
