use crate::error::Result;
use crate::model::{Extraction, ExtractionAttempt, MetricResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use validator::Validate;

/// How hard to try a single URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 20))]
    pub max_attempts: u32,

    /// Fixed wait before every attempt, the first one included.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Bounds of the uniformly random wait between a fault and the next attempt.
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            rate_limit_ms: default_rate_limit_ms(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    /// A fresh backoff delay, uniform over the configured range.
    pub fn jitter(&self) -> Duration {
        let lo = self.backoff_min_ms.min(self.backoff_max_ms);
        let hi = self.backoff_min_ms.max(self.backoff_max_ms);
        if lo == hi {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_rate_limit_ms() -> u64 {
    3_000
}

fn default_backoff_min_ms() -> u64 {
    2_000
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

/// Batch-wide request cadence. Lives for one batch.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_call: Option<Instant>,
    calls: u64,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: None,
            calls: 0,
        }
    }

    /// Sleeps the fixed interval, then stamps the call.
    pub async fn wait(&mut self) {
        if !self.interval.is_zero() {
            sleep(self.interval).await;
        }
        self.last_call = Some(Instant::now());
        self.calls += 1;
    }

    pub fn last_call(&self) -> Option<Instant> {
        self.last_call
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

fn log_attempt(url: &str, attempt: &ExtractionAttempt) {
    log::debug!(
        "Attempt {} for {} at {}: strategy={:?} error={:?}",
        attempt.number,
        url,
        attempt.started_at.to_rfc3339(),
        attempt.strategy,
        attempt.error
    );
}

/// Runs `op` under `policy` and always comes back with a result.
///
/// Every fault is retried after a jittered delay until the attempt budget is
/// spent; a not-found answer ends things at once. Every attempt waits on `limiter` first.
pub async fn with_retry<F, Fut>(
    policy: &RetryPolicy,
    limiter: &mut RateLimiter,
    url: &str,
    mut op: F,
) -> MetricResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Extraction>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for number in 1..=max_attempts {
        limiter.wait().await;
        let mut attempt = ExtractionAttempt::begin(number);

        match op().await {
            Ok(Extraction::Found { value, strategy }) => {
                attempt.strategy = strategy;
                log_attempt(url, &attempt);
                return MetricResult::success(value, number);
            }
            Ok(Extraction::NotFound) => {
                log_attempt(url, &attempt);
                return MetricResult::not_found(number);
            }
            Err(e) => {
                attempt.error = Some(e.to_string());
                log_attempt(url, &attempt);

                if number == max_attempts {
                    log::error!("Error fetching {} after {} attempts: {}", url, number, e);
                    return MetricResult::failed(number);
                }

                let delay = policy.jitter();
                log::warn!(
                    "Attempt {}/{} for {} failed: {} (retrying in {}ms)",
                    number,
                    max_attempts,
                    url,
                    e,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
        }
    }

    MetricResult::failed(max_attempts)
}
