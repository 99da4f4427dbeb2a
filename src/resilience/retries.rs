//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a failed async operation up to `max_retries` more times
//! - Sleep `base × 2^attempt` between attempts (optionally jittered)
//! - Stop early on errors the caller marks as not retryable
//!
//! # Design Decisions
//! - The outcome carries the attempt count so callers can report it
//! - Sleeping uses tokio time, so paused-clock tests run instantly

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::backoff::{calculate_backoff, with_jitter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms);
        if self.jitter {
            with_jitter(delay)
        } else {
            delay
        }
    }
}

#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    /// Attempts actually made, including the first.
    pub attempts: u32,
}

/// Run `op` until it succeeds, returns a non-retryable error, or the
/// retry budget is spent.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    mut op: F,
    retryable: R,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                }
            }
            Err(e) => {
                if attempt >= policy.max_retries || !retryable(&e) {
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt + 1,
                    };
                }
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Retrying after failure");
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

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            jitter: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let calls = &AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let outcome = retry_with_backoff(
            &policy(3),
            move |_| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("down")
                } else {
                    Ok(42)
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(outcome.result, Ok(42));
        assert_eq!(outcome.attempts, 3);
        // 100ms after attempt 0, 200ms after attempt 1
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let outcome: RetryOutcome<(), &str> =
            retry_with_backoff(&policy(2), |_| async { Err("down") }, |_| true).await;
        assert_eq!(outcome.result, Err("down"));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let outcome: RetryOutcome<(), &str> =
            retry_with_backoff(&policy(5), |_| async { Err("fatal") }, |e| *e != "fatal").await;
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_zero_retries_is_single_attempt() {
        let outcome: RetryOutcome<(), &str> =
            retry_with_backoff(&policy(0), |_| async { Err("down") }, |_| true).await;
        assert_eq!(outcome.attempts, 1);
    }
}
