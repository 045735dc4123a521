//! Configuration types for the orchestrator.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::limiter::RateLimitConfig;
use crate::retry::RetryPolicy;

/// Tuning knobs for the crawl loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Pause between consecutive pages of one job.
    ///
    /// Not applied after the last page. Default: 2s.
    #[serde(with = "duration_ms")]
    pub page_delay: Duration,

    /// Number of detail fetches issued concurrently.
    ///
    /// Each concurrent fetch usually owns a heavyweight browser context,
    /// so keep this small. Default: 3.
    pub item_batch_size: usize,

    /// Pause between detail-fetch batches. Default: 1s.
    #[serde(with = "duration_ms")]
    pub item_batch_delay: Duration,

    /// Timeout applied to each adapter network operation.
    ///
    /// `None` leaves timeouts to the adapter. Default: 60s.
    #[serde(with = "option_duration_ms")]
    pub operation_timeout: Option<Duration>,

    /// Overall deadline for one job's crawl loop.
    ///
    /// `None` lets a job run until its page range is exhausted.
    #[serde(with = "option_duration_ms")]
    pub job_timeout: Option<Duration>,

    /// Retry policy for network-facing steps.
    pub retry: RetryPolicy,

    /// Process-wide request ceiling.
    pub rate_limit: RateLimitConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_secs(2),
            item_batch_size: 3,
            item_batch_delay: Duration::from_secs(1),
            operation_timeout: Some(Duration::from_secs(60)),
            job_timeout: None,
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Set detail batch size (clamped to at least 1).
    pub fn with_item_batch(mut self, size: usize, delay: Duration) -> Self {
        self.item_batch_size = size.max(1);
        self.item_batch_delay = delay;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

/// Serialize `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Serialize `Option<Duration>` as optional integer milliseconds.
pub(crate) mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
