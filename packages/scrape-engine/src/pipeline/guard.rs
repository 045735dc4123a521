//! Guard applied to every adapter network call.

use std::future::Future;
use std::time::Duration;

use crate::error::{AdapterError, AdapterResult};
use crate::limiter::RateLimiter;
use crate::retry::{with_retry, RetryError, RetryPolicy};
use crate::types::config::OrchestratorConfig;

/// Runs an adapter operation under the shared rate limiter, the
/// per-operation timeout and the retry policy.
///
/// Every attempt, retries included, takes its own rate-limit permit.
#[derive(Clone, Copy)]
pub struct NetworkGuard<'a> {
    retry: &'a RetryPolicy,
    limiter: &'a RateLimiter,
    timeout: Option<Duration>,
}

impl<'a> NetworkGuard<'a> {
    pub fn new(config: &'a OrchestratorConfig, limiter: &'a RateLimiter) -> Self {
        Self {
            retry: &config.retry,
            limiter,
            timeout: config.operation_timeout,
        }
    }

    pub async fn call<T, F, Fut>(
        &self,
        label: &str,
        mut op: F,
    ) -> std::result::Result<T, RetryError<AdapterError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let limiter = self.limiter;
        let timeout = self.timeout;

        with_retry(self.retry, label, || {
            let attempt = op();
            async move {
                limiter.acquire().await;
                match timeout {
                    Some(limit) => match tokio::time::timeout(limit, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(AdapterError::Timeout {
                            operation: label.to_string(),
                            elapsed_ms: limit.as_millis() as u64,
                        }),
                    },
                    None => attempt.await,
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::RateLimitConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempts_time_out_and_retry() {
        let config = OrchestratorConfig::new()
            .with_operation_timeout(Some(Duration::from_secs(5)))
            .with_rate_limit(RateLimitConfig::unlimited());
        let limiter = RateLimiter::new(config.rate_limit);
        let guard = NetworkGuard::new(&config, &limiter);
        let calls = AtomicU32::new(0);

        let result: std::result::Result<u32, _> = guard
            .call("slow page", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(1)
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert!(matches!(err.last, AdapterError::Timeout { elapsed_ms: 5000, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_takes_a_permit() {
        let config = OrchestratorConfig::new().with_rate_limit(RateLimitConfig::per_minute(100));
        let limiter = RateLimiter::new(config.rate_limit);
        let guard = NetworkGuard::new(&config, &limiter);
        let calls = AtomicU32::new(0);

        let value = guard
            .call("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AdapterError::Extraction {
                            url: "https://example.com".into(),
                            reason: "empty body".into(),
                        })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(limiter.in_window().await, 3);
    }
}
