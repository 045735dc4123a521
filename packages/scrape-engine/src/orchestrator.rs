//! Job orchestrator.
//!
//! Owns the job lifecycle from submission to a terminal state:
//!
//! ```text
//! submit ─► validate ─► store.create(pending) ─► spawn ─┐
//!                                                       ▼
//!           instantiate adapter ─► running ─► initialize ─► crawl loop
//!                                                       │
//!           cleanup (always) ◄──────────────────────────┘
//!                 │
//!                 └─► completed | failed | cancelled
//! ```
//!
//! Background tasks are tracked in an in-memory running-job table. The table
//! only answers "is this job active right now"; the store stays the source of
//! truth for job state. Jobs run concurrently with no mutual exclusion, even
//! when they target the same source.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{EngineError, Result, StoreError};
use crate::limiter::RateLimiter;
use crate::pipeline::crawl::Crawl;
use crate::registry::{ExporterRegistry, SourceRegistry};
use crate::traits::{exporter::Exporter, store::JobStore};
use crate::types::config::OrchestratorConfig;
use crate::types::job::{Job, JobConfig, JobError, JobErrorKind, JobId, JobStatus, JobUpdate};

type Destinations = Vec<(String, Arc<dyn Exporter>)>;

/// A request to crawl one listing and export what it finds.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeRequest {
    /// Source id the adapter is resolved from
    pub source: String,

    /// Listing URL, destinations and page window
    pub config: JobConfig,
}

impl ScrapeRequest {
    pub fn new(source: impl Into<String>, config: JobConfig) -> Self {
        Self {
            source: source.into(),
            config,
        }
    }
}

/// Entry in the running-job table.
struct RunningJob {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    sources: SourceRegistry,
    exporters: ExporterRegistry,
    limiter: Arc<RateLimiter>,
    config: OrchestratorConfig,
    running: Mutex<HashMap<JobId, RunningJob>>,
}

/// Creates, runs and tracks scrape jobs.
///
/// Cheap to clone; clones share the running-job table and the rate limiter.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        sources: SourceRegistry,
        exporters: ExporterRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Self::with_limiter(store, sources, exporters, config, limiter)
    }

    /// Build with an existing limiter, e.g. one shared with another orchestrator.
    pub fn with_limiter(
        store: Arc<dyn JobStore>,
        sources: SourceRegistry,
        exporters: ExporterRegistry,
        config: OrchestratorConfig,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                sources,
                exporters,
                limiter,
                config,
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.inner.sources
    }

    pub fn exporters(&self) -> &ExporterRegistry {
        &self.inner.exporters
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.limiter
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Create a pending job and start it in the background.
    ///
    /// Returns as soon as the job record exists. Invalid requests are
    /// rejected before anything is persisted.
    pub async fn submit(&self, request: ScrapeRequest) -> Result<JobId> {
        let destinations = self.validate(&request)?;
        let job_id = self
            .inner
            .store
            .create(&request.source, JobStatus::Pending, &request.config)
            .await?;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        // Hold the table lock across the spawn so the task's own removal can
        // never run before the insert.
        let mut running = self.inner.running.lock().await;

        let this = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(this.run_job(job_id, &request, &destinations, &token))
                .catch_unwind()
                .await;

            if outcome.is_err() {
                error!(job_id = %job_id, "job task panicked");
                let error = JobError::new(JobErrorKind::Internal, "job task panicked");
                this.transition(job_id, JobUpdate::failed(0, error)).await;
            }

            this.inner.running.lock().await.remove(&job_id);
            let _ = done_tx.send(true);
            debug!(job_id = %job_id, "job task finished");
        });

        running.insert(
            job_id,
            RunningJob {
                handle,
                cancel,
                done: done_rx,
            },
        );
        drop(running);

        info!(job_id = %job_id, "job submitted");
        Ok(job_id)
    }

    /// Run a job inline and return its final record.
    ///
    /// Runs the same lifecycle as [`submit`](Self::submit) without the
    /// running-job table; it cannot be cancelled through [`cancel`](Self::cancel).
    pub async fn execute(&self, request: ScrapeRequest) -> Result<Job> {
        let destinations = self.validate(&request)?;
        let job_id = self
            .inner
            .store
            .create(&request.source, JobStatus::Pending, &request.config)
            .await?;

        self.run_job(job_id, &request, &destinations, &CancellationToken::new())
            .await;

        self.inner
            .store
            .get(job_id)
            .await?
            .ok_or(EngineError::JobNotFound(job_id))
    }

    /// Whether a background task for this job is still active.
    pub async fn is_running(&self, job_id: JobId) -> bool {
        self.inner
            .running
            .lock()
            .await
            .get(&job_id)
            .is_some_and(|job| !job.handle.is_finished())
    }

    /// Ids of jobs with an active background task.
    pub async fn running_jobs(&self) -> Vec<JobId> {
        let mut ids: Vec<_> = self.inner.running.lock().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Signal a running job to stop.
    ///
    /// The job finishes the page it is on (without exporting it) and ends
    /// `cancelled`. Returns false if the job is not running.
    pub async fn cancel(&self, job_id: JobId) -> bool {
        match self.inner.running.lock().await.get(&job_id) {
            Some(job) => {
                info!(job_id = %job_id, "cancelling job");
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for a job's background task to finish, then return the job.
    pub async fn wait(&self, job_id: JobId) -> Result<Option<Job>> {
        let done = self
            .inner
            .running
            .lock()
            .await
            .get(&job_id)
            .map(|job| job.done.clone());

        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }

        Ok(self.inner.store.get(job_id).await?)
    }

    /// Cancel every running job and wait for all tasks to drain.
    pub async fn shutdown(&self) {
        let waiting: Vec<_> = {
            let running = self.inner.running.lock().await;
            running
                .iter()
                .map(|(id, job)| {
                    job.cancel.cancel();
                    (*id, job.done.clone())
                })
                .collect()
        };

        info!(jobs = waiting.len(), "shutting down orchestrator");

        for (job_id, mut done) in waiting {
            let _ = done.wait_for(|finished| *finished).await;
            debug!(job_id = %job_id, "job drained");
        }
    }

    fn validate(&self, request: &ScrapeRequest) -> Result<Destinations> {
        if !self.inner.sources.is_registered(&request.source) {
            return Err(EngineError::UnknownSource(request.source.clone()));
        }

        let config = &request.config;
        if config.start < 1 {
            return Err(EngineError::InvalidRequest {
                reason: "start must be at least 1".into(),
            });
        }
        if config.limit < 1 {
            return Err(EngineError::InvalidRequest {
                reason: "limit must be at least 1".into(),
            });
        }

        let url = Url::parse(&config.url).map_err(|e| EngineError::InvalidRequest {
            reason: format!("invalid url {}: {}", config.url, e),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EngineError::InvalidRequest {
                reason: format!("unsupported url scheme: {}", url.scheme()),
            });
        }

        self.inner.exporters.resolve(&config.exporters)
    }

    async fn run_job(
        &self,
        job_id: JobId,
        request: &ScrapeRequest,
        destinations: &[(String, Arc<dyn Exporter>)],
        cancel: &CancellationToken,
    ) {
        let mut adapter = match self.inner.sources.instantiate(&request.source) {
            Ok(adapter) => adapter,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "no adapter for job");
                let error = JobError::new(JobErrorKind::AdapterInit, e.to_string());
                self.transition(job_id, JobUpdate::failed(0, error)).await;
                return;
            }
        };

        self.transition(job_id, JobUpdate::started()).await;
        info!(
            job_id = %job_id,
            source = %request.source,
            url = %request.config.url,
            start = request.config.start,
            limit = request.config.limit,
            "job started"
        );

        let crawl = Crawl::new(
            job_id,
            &self.inner.config,
            &self.inner.limiter,
            self.inner.store.as_ref(),
            destinations,
            cancel,
        );

        let run = async {
            match adapter.initialize().await {
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "adapter initialization failed");
                    Err(JobError::new(JobErrorKind::AdapterInit, e.to_string()))
                }
                Ok(()) => {
                    let crawling = crawl.run(adapter.as_ref(), &request.config);
                    match self.inner.config.job_timeout {
                        Some(limit) => match tokio::time::timeout(limit, crawling).await {
                            Ok(result) => result,
                            Err(_) => {
                                warn!(
                                    job_id = %job_id,
                                    timeout_secs = limit.as_secs_f64(),
                                    "job deadline exceeded"
                                );
                                Err(JobError::new(
                                    JobErrorKind::Timeout,
                                    format!("job exceeded its {:?} deadline", limit),
                                ))
                            }
                        },
                        None => crawling.await,
                    }
                }
            }
        };

        // A panic inside the adapter must still reach cleanup below.
        let result = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!(job_id = %job_id, "job panicked while crawling");
                Err(JobError::new(JobErrorKind::Internal, "job task panicked"))
            }
        };

        if let Err(e) = adapter.cleanup().await {
            error!(job_id = %job_id, error = %e, "adapter cleanup failed");
        }

        let items = crawl.items_found();
        let update = match result {
            Ok(summary) if summary.cancelled => {
                info!(job_id = %job_id, items, "job cancelled");
                JobUpdate::cancelled(items, JobError::new(JobErrorKind::Cancelled, "job cancelled"))
            }
            Ok(summary) => {
                info!(
                    job_id = %job_id,
                    items = summary.items,
                    pages_crawled = summary.pages_crawled,
                    pages_failed = summary.pages_failed,
                    "job completed"
                );
                JobUpdate::completed(summary.items)
            }
            Err(error) => {
                error!(job_id = %job_id, kind = ?error.kind, error = %error.message, "job failed");
                JobUpdate::failed(items, error)
            }
        };

        self.transition(job_id, update).await;
    }

    /// Persist a lifecycle update.
    ///
    /// Illegal transitions and store failures are logged, never raised.
    async fn transition(&self, job_id: JobId, update: JobUpdate) {
        match self.inner.store.update(job_id, update).await {
            Ok(()) => {}
            Err(StoreError::IllegalTransition { from, to }) => {
                error!(job_id = %job_id, %from, %to, "illegal job transition ignored");
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "failed to persist job update");
            }
        }
    }
}
