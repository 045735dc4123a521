//! SQLite job store.
//!
//! A file-based backend for single-process deployments. Timestamps are stored
//! as RFC 3339 text, config and error payloads as JSON text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::JobStore;
use crate::types::job::{Job, JobConfig, JobId, JobStats, JobStatus, JobUpdate};

/// SQLite-based job store.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Open (and migrate) a store at the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://./jobs.db?mode=rwc` - File-based, created if missing
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        // Every connection to `:memory:` is a separate database.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect(database_url)
                .await?
        } else {
            let options = SqliteConnectOptions::from_str(database_url)?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and run migrations.
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scrape_jobs (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                status TEXT NOT NULL,
                config TEXT NOT NULL,
                items_found INTEGER NOT NULL DEFAULT 0,
                items_processed INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_scrape_jobs_status ON scrape_jobs(status);
            CREATE INDEX IF NOT EXISTS idx_scrape_jobs_created_at ON scrape_jobs(created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    source: String,
    status: String,
    config: String,
    items_found: i64,
    items_processed: i64,
    error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl JobRow {
    fn into_job(self) -> StoreResult<Job> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let id = self
            .id
            .parse::<JobId>()
            .map_err(|e| corrupt(format!("invalid id: {}", e)))?;
        let status = self.status.parse::<JobStatus>().map_err(corrupt)?;
        let config: JobConfig = serde_json::from_str(&self.config)
            .map_err(|e| corrupt(format!("invalid config JSON: {}", e)))?;
        let error = self
            .error
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt(format!("invalid error JSON: {}", e)))?;

        Ok(Job {
            id,
            source: self.source.clone(),
            status,
            config,
            items_found: self.items_found.max(0) as u64,
            items_processed: self.items_processed.max(0) as u64,
            error,
            created_at: parse_time(&self.created_at).map_err(corrupt)?,
            started_at: self.started_at.as_deref().map(parse_time).transpose().map_err(corrupt)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_time)
                .transpose()
                .map_err(corrupt)?,
        })
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid date: {}", e))
}

fn encode_json<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(Box::new(e)))
}

const SELECT_JOB: &str = r#"
    SELECT id, source, status, config, items_found, items_processed, error,
           created_at, started_at, completed_at
    FROM scrape_jobs
"#;

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, source: &str, status: JobStatus, config: &JobConfig) -> StoreResult<JobId> {
        let job = Job::new(source, status, config.clone());

        sqlx::query(
            r#"
            INSERT INTO scrape_jobs (id, source, status, config, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.source.as_str())
        .bind(job.status.as_str())
        .bind(encode_json(&job.config)?)
        .bind(job.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(job.id)
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> StoreResult<()> {
        // Single statement: the status guard, monotonic counters and
        // first-write-wins timestamps are all evaluated under the write lock.
        let mut sql = String::from(
            r#"
            UPDATE scrape_jobs
            SET status = COALESCE(?, status),
                items_found = MAX(items_found, COALESCE(?, items_found)),
                items_processed = MAX(items_processed, COALESCE(?, items_processed)),
                error = COALESCE(?, error),
                started_at = COALESCE(started_at, ?),
                completed_at = COALESCE(completed_at, ?)
            WHERE id = ?
            "#,
        );
        let predecessors = update.status.map(|next| next.predecessors()).unwrap_or_default();
        if update.status.is_some() {
            if predecessors.is_empty() {
                sql.push_str(" AND 0");
            } else {
                let placeholders = vec!["?"; predecessors.len()].join(", ");
                sql.push_str(&format!(" AND status IN ({})", placeholders));
            }
        }

        let error = update.error.as_ref().map(encode_json).transpose()?;

        let mut query = sqlx::query(&sql)
            .bind(update.status.map(|s| s.as_str()))
            .bind(update.items_found.map(|n| n as i64))
            .bind(update.items_processed.map(|n| n as i64))
            .bind(error)
            .bind(update.started_at.map(|t| t.to_rfc3339()))
            .bind(update.completed_at.map(|t| t.to_rfc3339()))
            .bind(id.to_string());
        for status in &predecessors {
            query = query.bind(status.as_str());
        }

        if query.execute(&self.pool).await?.rows_affected() > 0 {
            return Ok(());
        }

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM scrape_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match (current, update.status) {
            (Some(current), Some(next)) => {
                let from = current.parse::<JobStatus>().map_err(|reason| StoreError::Corrupt {
                    id: id.to_string(),
                    reason,
                })?;
                Err(StoreError::IllegalTransition { from, to: next })
            }
            _ => Err(StoreError::NotFound(id)),
        }
    }

    async fn get(&self, id: JobId) -> StoreResult<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_JOB))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn list(&self, status: Option<JobStatus>, limit: usize, offset: usize) -> StoreResult<Vec<Job>> {
        let rows: Vec<JobRow> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "{} WHERE status = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                    SELECT_JOB
                ))
                .bind(status.as_str())
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                    SELECT_JOB
                ))
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn stats(&self) -> StoreResult<JobStats> {
        let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*), COALESCE(SUM(items_found), 0), COALESCE(SUM(items_processed), 0)
            FROM scrape_jobs
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = JobStats::default();
        for (status, count, found, processed) in rows {
            let status = status.parse::<JobStatus>().map_err(|reason| StoreError::Corrupt {
                id: "<aggregate>".to_string(),
                reason,
            })?;
            let count = count.max(0) as u64;
            stats.total += count;
            match status {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Running => stats.running = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
                JobStatus::Cancelled => stats.cancelled = count,
            }
            stats.items_found += found.max(0) as u64;
            stats.items_processed += processed.max(0) as u64;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::job::{JobError, JobErrorKind};

    fn config() -> JobConfig {
        JobConfig::new("https://example.com/listings")
            .with_exporters(["memory"])
            .with_pages(2, 4)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        let id = store.create("test", JobStatus::Pending, &config()).await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.config, config());
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_failed_job_keeps_error_payload() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        let id = store.create("test", JobStatus::Pending, &config()).await.unwrap();

        store.update(id, JobUpdate::started()).await.unwrap();
        let error = JobError::new(JobErrorKind::PageDiscovery, "listing unreachable");
        store.update(id, JobUpdate::failed(0, error.clone())).await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_ref().map(|e| e.kind), Some(JobErrorKind::PageDiscovery));
        assert_eq!(job.error.as_ref().map(|e| e.message.as_str()), Some("listing unreachable"));
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        let id = store.create("test", JobStatus::Pending, &config()).await.unwrap();
        store.update(id, JobUpdate::started()).await.unwrap();
        store.update(id, JobUpdate::completed(3)).await.unwrap();

        let err = store.update(id, JobUpdate::started()).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn test_update_unknown_job_is_not_found() {
        let store = SqliteJobStore::in_memory().await.unwrap();

        let err = store.update(JobId::new(), JobUpdate::started()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let err = store.update(JobId::new(), JobUpdate::progress(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_counters_and_timestamps_never_regress() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        let id = store.create("test", JobStatus::Pending, &config()).await.unwrap();
        store.update(id, JobUpdate::started()).await.unwrap();
        let started_at = store.get(id).await.unwrap().unwrap().started_at;

        store.update(id, JobUpdate::progress(8)).await.unwrap();
        store.update(id, JobUpdate::progress(5)).await.unwrap();
        store.update(id, JobUpdate::completed(6)).await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.items_found, 8);
        assert_eq!(job.started_at, started_at);
        assert!(job.error.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lifecycles_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
        let store = std::sync::Arc::new(SqliteJobStore::new(&url).await.unwrap());

        let mut handles = Vec::new();
        for _ in 0..24 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = store.create("test", JobStatus::Pending, &config()).await.unwrap();
                store.update(id, JobUpdate::started()).await.unwrap();
                for page in 1..=10 {
                    store.update(id, JobUpdate::progress(page * 2)).await.unwrap();
                }
                store.update(id, JobUpdate::completed(20)).await.unwrap();
                id
            }));
        }

        for handle in handles {
            let id = handle.await.unwrap();
            let job = store.get(id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.items_found, 20);
            assert_eq!(job.items_processed, 20);
            assert!(job.started_at.is_some());
            assert!(job.completed_at >= job.started_at);
        }
        assert_eq!(store.stats().await.unwrap().completed, 24);
    }

    #[tokio::test]
    async fn test_list_and_stats() {
        let store = SqliteJobStore::in_memory().await.unwrap();
        let a = store.create("test", JobStatus::Pending, &config()).await.unwrap();
        let _b = store.create("test", JobStatus::Pending, &config()).await.unwrap();

        store.update(a, JobUpdate::started()).await.unwrap();
        store.update(a, JobUpdate::completed(12)).await.unwrap();

        let completed = store.list(Some(JobStatus::Completed), 10, 0).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].items_processed, 12);

        assert_eq!(store.list(None, 10, 0).await.unwrap().len(), 2);
        assert_eq!(store.list(None, 10, 1).await.unwrap().len(), 1);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.items_found, 12);
    }
}
