//! In-memory job store for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::JobStore;
use crate::types::job::{Job, JobConfig, JobId, JobStats, JobStatus, JobUpdate};

/// In-memory storage for job records.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored jobs.
    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, source: &str, status: JobStatus, config: &JobConfig) -> StoreResult<JobId> {
        let job = Job::new(source, status, config.clone());
        let id = job.id;
        self.jobs.write().await.insert(id, job);
        Ok(id)
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if let Some(next) = update.status {
            if !job.status.can_transition_to(next) {
                return Err(StoreError::IllegalTransition {
                    from: job.status,
                    to: next,
                });
            }
        }

        job.apply(&update);
        Ok(())
    }

    async fn get(&self, id: JobId) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list(&self, status: Option<JobStatus>, limit: usize, offset: usize) -> StoreResult<Vec<Job>> {
        let jobs = self.jobs.read().await;

        let mut matching: Vec<_> = jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn stats(&self) -> StoreResult<JobStats> {
        let jobs = self.jobs.read().await;
        let mut stats = JobStats::default();
        for job in jobs.values() {
            stats.record(job);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JobConfig {
        JobConfig::new("https://example.com/listings").with_pages(1, 3)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryJobStore::new();
        let id = store.create("test", JobStatus::Pending, &config()).await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.source, "test");
        assert_eq!(job.config.limit, 3);
        assert!(job.started_at.is_none());
    }

    #[tokio::test]
    async fn test_update_rejects_illegal_transition() {
        let store = MemoryJobStore::new();
        let id = store.create("test", JobStatus::Pending, &config()).await.unwrap();

        store.update(id, JobUpdate::started()).await.unwrap();
        store.update(id, JobUpdate::completed(5)).await.unwrap();

        let err = store.update(id, JobUpdate::started()).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.items_found, 5);
    }

    #[tokio::test]
    async fn test_update_missing_job() {
        let store = MemoryJobStore::new();
        let err = store.update(JobId::new(), JobUpdate::started()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let store = MemoryJobStore::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(store.create("test", JobStatus::Pending, &config()).await.unwrap());
        }
        store.update(ids[0], JobUpdate::started()).await.unwrap();

        let running = store.list(Some(JobStatus::Running), 10, 0).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, ids[0]);

        let page = store.list(None, 2, 1).await.unwrap();
        assert_eq!(page.len(), 2);

        let pending = store.count_by_status(JobStatus::Pending).await.unwrap();
        assert_eq!(pending, 4);
    }
}
