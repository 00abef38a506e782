//! Bounded retry with randomized backoff
//!
//! Two flavours are used across the control plane:
//! - [`RetryPolicy::run`] retries transient failures (fetches, agent probes, pod addresses)
//!   sleeping a uniformly drawn delay between attempts.
//! - [`retry_on_conflict`] retries optimistic-concurrency conflicts on status writes only.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Lower bound of the delay between attempts
    pub min_delay: Duration,

    /// Upper bound of the delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            min_delay: Duration::from_millis(3000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay: min_delay.min(max_delay),
            max_delay,
        }
    }

    /// Draw a delay uniformly from `[min_delay, max_delay]`.
    pub fn jittered_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> AppResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.jittered_delay();
                    debug!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(what, attempts = attempt, error = %e, "Giving up after retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Retry `op` while it fails with a resource-version conflict, at most `attempts` times.
pub async fn retry_on_conflict<T, F, Fut>(attempts: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let attempts = attempts.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() => {
                debug!(attempt, "Conflict on write, retrying");
                last = Some(e);
                let jitter = rand::rng().random_range(0..10u64);
                tokio::time::sleep(Duration::from_millis(10 + jitter)).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last.unwrap_or_else(|| AppError::Conflict("conflict retries exhausted".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.jittered_delay();
            assert!(delay >= Duration::from_millis(3000));
            assert!(delay <= Duration::from_millis(5000));
        }
    }

    #[tokio::test]
    async fn test_run_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = fast_policy(3)
            .run("probe", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::Unavailable("pod ip not assigned".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = fast_policy(5)
            .run("probe", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::BadRequest("malformed".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_succeeds_after_transient_failure() {
        let result = fast_policy(5)
            .run("probe", |attempt| async move {
                if attempt < 3 {
                    Err(AppError::Unavailable("not yet".into()))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_on_conflict() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict(5, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::Conflict("stale resourceVersion".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);

        let exhausted: AppResult<()> =
            retry_on_conflict(2, || async { Err(AppError::Conflict("again".into())) }).await;
        assert!(exhausted.unwrap_err().is_conflict());
    }
}
