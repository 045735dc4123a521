//! Job model and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Opaque job identifier.
///
/// Backed by a UUID v7 so ids sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal lifecycle edge.
    ///
    /// ```text
    /// pending ──► running ──► completed
    ///    │           ├──────► failed
    ///    │           └──────► cancelled
    ///    ├──────────────────► failed
    ///    └──────────────────► cancelled
    /// ```
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// States from which `self` may be entered.
    pub fn predecessors(&self) -> Vec<JobStatus> {
        JobStatus::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(*self))
            .collect()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status: {}", s))
    }
}

/// Classification of a fatal job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// Adapter could not acquire its resources
    AdapterInit,
    /// Total page count could not be determined
    PageDiscovery,
    /// Job exceeded its overall deadline
    Timeout,
    /// Job was cancelled while running
    Cancelled,
    /// Anything else escaping the crawl loop
    Internal,
}

/// Structured error payload persisted on a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub message: String,
    pub kind: JobErrorKind,
    pub occurred_at: DateTime<Utc>,
}

impl JobError {
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            occurred_at: Utc::now(),
        }
    }
}

// ============================================================================
// Job Model
// ============================================================================

/// The request a job was spawned from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    /// Listing URL the crawl starts from
    pub url: String,

    /// Destination ids records are exported to
    pub exporters: Vec<String>,

    /// First page to visit (1-based)
    pub start: u32,

    /// Maximum number of pages to visit
    pub limit: u32,
}

impl JobConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exporters: Vec::new(),
            start: 1,
            limit: 1,
        }
    }

    pub fn with_exporters(mut self, exporters: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exporters = exporters.into_iter().map(|e| e.into()).collect();
        self
    }

    pub fn with_pages(mut self, start: u32, limit: u32) -> Self {
        self.start = start;
        self.limit = limit;
        self
    }
}

/// One execution of a crawl-and-export task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub source: String,
    pub status: JobStatus,
    pub config: JobConfig,
    pub items_found: u64,
    pub items_processed: u64,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Build a fresh job record. Stores call this from `create`.
    pub fn new(source: impl Into<String>, status: JobStatus, config: JobConfig) -> Self {
        Self {
            id: JobId::new(),
            source: source.into(),
            status,
            config,
            items_found: 0,
            items_processed: 0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Wall-clock time spent running.
    ///
    /// Finished jobs measure start to completion; running jobs measure start to
    /// now; jobs that never started have no duration.
    pub fn duration(&self) -> Option<chrono::Duration> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some(end - started)
    }

    /// Apply a partial update in place.
    ///
    /// Write-once timestamps keep their first value and counters never move
    /// backwards, so a late or duplicated update cannot break the lifecycle
    /// invariants.
    pub fn apply(&mut self, update: &JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(found) = update.items_found {
            self.items_found = self.items_found.max(found);
        }
        if let Some(processed) = update.items_processed {
            self.items_processed = self.items_processed.max(processed);
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
        if self.started_at.is_none() {
            self.started_at = update.started_at;
        }
        if self.completed_at.is_none() {
            self.completed_at = update.completed_at;
        }
    }
}

/// Partial set of fields for `JobStore::update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub items_found: Option<u64>,
    pub items_processed: Option<u64>,
    pub error: Option<JobError>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    /// pending -> running.
    pub fn started() -> Self {
        Self {
            status: Some(JobStatus::Running),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Progress counters for a running job.
    pub fn progress(items: u64) -> Self {
        Self {
            items_found: Some(items),
            items_processed: Some(items),
            ..Default::default()
        }
    }

    /// running -> completed.
    pub fn completed(items: u64) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            completed_at: Some(Utc::now()),
            ..Self::progress(items)
        }
    }

    /// -> failed, with the captured error.
    pub fn failed(items: u64, error: JobError) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            completed_at: Some(error.occurred_at),
            error: Some(error),
            ..Self::progress(items)
        }
    }

    /// -> cancelled.
    pub fn cancelled(items: u64, error: JobError) -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            ..Self::failed(items, error)
        }
    }
}

/// Job counts per lifecycle state plus record totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub items_found: u64,
    pub items_processed: u64,
}

impl JobStats {
    /// Add one job to the aggregate.
    pub fn record(&mut self, job: &Job) {
        self.total += 1;
        match job.status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
        self.items_found += job.items_found;
        self.items_processed += job.items_processed;
    }

    pub fn count(&self, status: JobStatus) -> u64 {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Running => self.running,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_edges() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));

        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn test_predecessors() {
        assert_eq!(JobStatus::Running.predecessors(), vec![JobStatus::Pending]);
        assert_eq!(
            JobStatus::Failed.predecessors(),
            vec![JobStatus::Pending, JobStatus::Running]
        );
        assert!(JobStatus::Pending.predecessors().is_empty());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in JobStatus::ALL {
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_apply_keeps_timestamps_write_once() {
        let mut job = Job::new("test", JobStatus::Pending, JobConfig::new("https://example.com"));

        let first = JobUpdate::started();
        let first_started = first.started_at;
        job.apply(&first);

        let mut again = JobUpdate::started();
        again.started_at = Some(Utc::now() + chrono::Duration::seconds(30));
        job.apply(&again);

        assert_eq!(job.started_at, first_started);
    }

    #[test]
    fn test_apply_counters_never_decrease() {
        let mut job = Job::new("test", JobStatus::Running, JobConfig::new("https://example.com"));
        job.apply(&JobUpdate::progress(10));
        job.apply(&JobUpdate::progress(4));

        assert_eq!(job.items_found, 10);
        assert_eq!(job.items_processed, 10);
    }

    #[test]
    fn test_duration() {
        let mut job = Job::new("test", JobStatus::Pending, JobConfig::new("https://example.com"));
        assert!(job.duration().is_none());

        let started = Utc::now() - chrono::Duration::seconds(90);
        job.started_at = Some(started);
        job.completed_at = Some(started + chrono::Duration::seconds(60));

        assert_eq!(job.duration(), Some(chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_stats_record() {
        let mut stats = JobStats::default();
        let mut done = Job::new("a", JobStatus::Completed, JobConfig::new("https://a.test"));
        done.items_found = 7;
        done.items_processed = 7;
        stats.record(&done);
        stats.record(&Job::new("a", JobStatus::Pending, JobConfig::new("https://a.test")));

        assert_eq!(stats.total, 2);
        assert_eq!(stats.count(JobStatus::Completed), 1);
        assert_eq!(stats.count(JobStatus::Pending), 1);
        assert_eq!(stats.items_found, 7);
    }
}
