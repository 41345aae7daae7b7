//! Retry executor and upstream throttle
//!
//! Every call into the management API goes through [`RetryExecutor::execute`]:
//! the call first waits on the process-wide [`UpstreamThrottle`], then runs,
//! and a failure is handed to the caller's classifier. Retryable failures
//! are retried after a linear backoff that never drops below the minimum
//! delay; fatal failures propagate immediately. The total number of
//! attempts never exceeds the configured ceiling.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{RetryConfig, ThrottleConfig};
use crate::error::UpstreamError;

/// Type alias for the rate limiter.
type RateLimiterType = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// What to do with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Transient (rate limited, timed out); try again after a delay
    Retryable,
    /// Permanent; surface to the caller without further attempts
    Fatal,
}

/// Default classifier for management API calls
pub fn classify_upstream(err: &UpstreamError) -> Classification {
    if err.is_transient() {
        Classification::Retryable
    } else {
        Classification::Fatal
    }
}

/// Attempt ceiling and backoff bounds
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given `attempt` failures so far.
    ///
    /// Linear in the attempt number, capped at `max_delay`, never below `min_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let linear = self.min_delay.saturating_mul(attempt.max(1));
        linear.min(self.max_delay).max(self.min_delay)
    }
}

/// Process-wide limiter on outbound upstream calls.
///
/// Shared by every executor built from the same instance, so concurrent
/// requests and an in-flight refresh draw from one quota. Calls are spaced
/// evenly with no burst allowance: no one-second window ever holds more
/// than `calls_per_second` calls.
pub struct UpstreamThrottle {
    limiter: RateLimiterType,
    calls_per_second: u32,
}

impl UpstreamThrottle {
    pub fn new(calls_per_second: u32) -> Self {
        let rate = NonZeroU32::new(calls_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
        Self {
            limiter: GovernorRateLimiter::direct(quota),
            calls_per_second: rate.get(),
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(config.calls_per_second)
    }

    pub fn calls_per_second(&self) -> u32 {
        self.calls_per_second
    }

    /// Wait until one more call fits in the quota
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

/// Runs upstream operations with bounded retries under the shared throttle
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    throttle: Arc<UpstreamThrottle>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, throttle: Arc<UpstreamThrottle>) -> Self {
        Self { policy, throttle }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `operation` until it succeeds, fails fatally, or the attempt
    /// ceiling is reached. Returns the last error on failure.
    pub async fn execute<T, E, F, Fut, C>(
        &self,
        label: &str,
        mut operation: F,
        classify: C,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> Classification,
        E: std::fmt::Display,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.throttle.acquire().await;

            let err = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = label, attempt, "Upstream call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            match classify(&err) {
                Classification::Fatal => {
                    warn!(operation = label, attempt, error = %err, "Upstream call failed permanently");
                    return Err(err);
                }
                Classification::Retryable if attempt >= self.policy.max_attempts => {
                    warn!(
                        operation = label,
                        attempts = attempt,
                        error = %err,
                        "Upstream call failed, retries exhausted"
                    );
                    return Err(err);
                }
                Classification::Retryable => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// [`execute`](Self::execute) with the default upstream classifier
    pub async fn execute_upstream<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        self.execute(label, operation, classify_upstream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    fn executor(max_attempts: u32, min_delay_ms: u64) -> RetryExecutor {
        RetryExecutor::new(
            RetryPolicy {
                max_attempts,
                min_delay: Duration::from_millis(min_delay_ms),
                max_delay: Duration::from_millis(min_delay_ms * 4),
            },
            Arc::new(UpstreamThrottle::new(1000)),
        )
    }

    #[test]
    fn test_backoff_is_linear_and_bounded() {
        let policy = RetryPolicy {
            max_attempts: 10,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(5), Duration::from_millis(250));
        assert_eq!(policy.delay_after(0), Duration::from_millis(100));
    }

    #[test]
    fn test_max_delay_below_min_still_respects_min() {
        let policy = RetryPolicy {
            max_attempts: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(10),
        };
        assert_eq!(policy.delay_after(3), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_retryable_failure_exhausts_exact_attempt_ceiling() {
        let exec = executor(4, 20);
        let calls = AtomicU32::new(0);
        let stamps = Mutex::new(Vec::new());

        let result: Result<(), UpstreamError> = exec
            .execute_upstream("always-429", || {
                calls.fetch_add(1, Ordering::SeqCst);
                stamps.lock().unwrap().push(Instant::now());
                async { Err(UpstreamError::RateLimited { retry_after: None }) }
            })
            .await;

        assert!(matches!(result, Err(UpstreamError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let stamps = stamps.into_inner().unwrap();
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(20));
        }
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let exec = executor(10, 5);
        let calls = AtomicU32::new(0);

        let result: Result<(), UpstreamError> = exec
            .execute_upstream("bad-request", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(UpstreamError::Status {
                        status: 400,
                        message: "malformed".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let exec = executor(5, 1);
        let calls = AtomicU32::new(0);

        let result = exec
            .execute_upstream("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(UpstreamError::Timeout("slow".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let exec = executor(3, 1);
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = exec
            .execute(
                "custom",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("boom".to_string()) }
                },
                |_| Classification::Retryable,
            )
            .await;

        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_throttle_is_shared_across_executors() {
        let throttle = Arc::new(UpstreamThrottle::new(5));
        let a = RetryExecutor::new(RetryPolicy::default(), throttle.clone());
        let b = RetryExecutor::new(RetryPolicy::default(), throttle);

        let start = Instant::now();
        let mut stamps = Vec::new();
        for i in 0..12 {
            let exec = if i % 2 == 0 { &a } else { &b };
            let _: Result<(), UpstreamError> = exec.execute_upstream("noop", || async { Ok(()) }).await;
            stamps.push(start.elapsed());
        }

        // Any 6 consecutive calls span at least a full second
        for window in stamps.windows(6) {
            let span = window[5] - window[0];
            assert!(span >= Duration::from_millis(980), "6 calls within {span:?}");
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_quota() {
        let throttle = Arc::new(UpstreamThrottle::new(5));
        let start = Instant::now();

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let throttle = throttle.clone();
                tokio::spawn(async move {
                    throttle.acquire().await;
                    start.elapsed()
                })
            })
            .collect();
        let mut stamps = Vec::new();
        for task in tasks {
            stamps.push(task.await.unwrap());
        }
        stamps.sort();

        let within_first_second = stamps
            .iter()
            .filter(|t| **t < Duration::from_millis(980))
            .count();
        assert!(within_first_second <= 5, "{within_first_second} calls in the first second");
    }
}
