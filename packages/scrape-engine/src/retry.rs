//! Retry executor with capped exponential backoff.
//!
//! Every failure is retried the same way; there is no transient/permanent
//! classification. The executor wraps page navigation, detail fetches and
//! total-page discovery. Export calls are never retried here (fan-out has its
//! own isolation policy).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::types::config::duration_ms;

/// Configuration for the retry executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of invocations, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,

    /// Upper bound for any single delay.
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    ///
    /// `min(base_delay * 2^(attempt - 1), max_delay)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// The last failure of an operation that exhausted its attempts.
#[derive(Debug)]
pub struct RetryError<E> {
    /// What was being retried
    pub label: String,

    /// Number of invocations made
    pub attempts: u32,

    /// Error returned by the final attempt
    pub last: E,
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.label, self.attempts, self.last
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last)
    }
}

impl<E> RetryError<E> {
    /// Drop the annotation and keep the underlying error.
    pub fn into_inner(self) -> E {
        self.last
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` is reached.
///
/// Sleeps between attempts (never after the last one). On exhaustion the
/// final attempt's error is returned, annotated with `label`.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> std::result::Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                warn!(label, attempts = attempt, error = %e, "giving up");
                return Err(RetryError {
                    label: label.to_string(),
                    attempts: attempt,
                    last: e,
                });
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn test_delay_sequence() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1000), Duration::from_millis(5000));

        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(5000)); // capped
        assert_eq!(policy.delay_for(40), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_operation() {
        let calls = Arc::new(AtomicU32::new(0));
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let result: std::result::Result<(), RetryError<String>> =
            with_retry(&RetryPolicy::default(), "fetch page 1", || {
                let calls = calls.clone();
                let stamps = stamps.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    stamps.lock().unwrap().push(start.elapsed());
                    Err(format!("attempt {} failed", n))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.label, "fetch page 1");
        assert_eq!(err.last, "attempt 3 failed");

        let stamps = stamps.lock().unwrap().clone();
        assert_eq!(stamps[1] - stamps[0], Duration::from_millis(1000));
        assert_eq!(stamps[2] - stamps[1], Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));

        let value = with_retry(&RetryPolicy::default(), "flaky", || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("boom")
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_after_last_attempt() {
        let start = Instant::now();
        let policy = RetryPolicy::new(2, Duration::from_millis(500), Duration::from_secs(10));

        let _ = with_retry(&policy, "once", || async { Err::<(), _>("nope") }).await;

        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);

        let _ = with_retry(&policy, "zero", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("nope") }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
