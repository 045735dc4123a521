//! Sliding-window request throttle.
//!
//! Keeps the timestamps of the requests made in the trailing 60 seconds and
//! suspends callers once the configured per-minute ceiling is reached. Unlike a
//! fixed window, there is no burst at window boundaries: at no instant does the
//! trailing minute contain more than `requests_per_minute` requests.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Length of the rate window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum requests in any trailing 60s window. `0` disables limiting.
    pub requests_per_minute: u32,

    /// Advisory burst size. Reported, not enforced beyond the ceiling.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst: 10,
        }
    }
}

impl RateLimitConfig {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            ..Self::default()
        }
    }

    pub fn unlimited() -> Self {
        Self {
            requests_per_minute: 0,
            burst: 0,
        }
    }
}

/// Process-wide sliding-window limiter.
///
/// Shared by every running job behind an `Arc`.
pub struct RateLimiter {
    config: RateLimitConfig,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Wait for a permit, then record the request.
    ///
    /// Returns how long the caller was suspended.
    pub async fn acquire(&self) -> Duration {
        let limit = self.config.requests_per_minute as usize;
        let started = Instant::now();

        if limit == 0 {
            return Duration::ZERO;
        }

        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();
                purge(&mut timestamps, now);

                if timestamps.len() < limit {
                    timestamps.push_back(now);
                    return started.elapsed();
                }

                // Window is full: wait until the oldest entry ages out.
                timestamps
                    .front()
                    .map(|oldest| (*oldest + WINDOW).saturating_duration_since(now))
                    .unwrap_or_default()
            };

            debug!(
                wait_ms = wait.as_millis() as u64,
                limit, "rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests recorded in the current window.
    pub async fn in_window(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        purge(&mut timestamps, Instant::now());
        timestamps.len()
    }
}

fn purge(timestamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= WINDOW {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
