//! Circuit breaker for remote delivery.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: remote assumed down, calls fail fast without I/O
//! - Half-Open: testing if the remote recovered, one call at a time
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_threshold consecutive failures
//! Open → Half-Open: reset_timeout elapsed (checked on the next call)
//! Half-Open → Closed: success_threshold consecutive successful trials
//! Half-Open → Open: any trial fails
//! ```
//!
//! # Design Decisions
//! - One breaker per remote logger instance
//! - Every call runs under a hard timeout; expiry is a failure
//! - A trial abandoned mid-flight (future dropped) frees the trial slot

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::SharedClock;
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }

    fn gauge_value(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,
    /// Time the circuit stays open before a trial is allowed.
    pub reset_timeout_ms: u64,
    /// Per-call deadline.
    pub timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 60_000,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    Open,

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the wrapped call was actually attempted.
    pub fn was_attempted(&self) -> bool {
        !matches!(self, CircuitBreakerError::Open)
    }
}

/// Point-in-time view for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    clock: SharedClock,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        metrics::record_circuit_state(name, CircuitState::Closed.gauge_value());
        Self {
            name,
            config,
            clock,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, applying the open → half-open transition if due.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        self.maybe_half_open(&mut inner);
        inner.state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        self.maybe_half_open(&mut inner);
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            opened_at: inner.opened_at,
        }
    }

    /// Run `op` through the breaker with the configured timeout.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut permit = self.acquire().ok_or(CircuitBreakerError::Open)?;

        let limit = Duration::from_millis(self.config.timeout_ms);
        match with_timeout(limit, op()).await {
            Ok(Ok(value)) => {
                permit.settle(true);
                Ok(value)
            }
            Ok(Err(e)) => {
                permit.settle(false);
                Err(CircuitBreakerError::Inner(e))
            }
            Err(timeout) => {
                permit.settle(false);
                tracing::warn!(breaker = self.name, timeout_ms = self.config.timeout_ms, "Circuit breaker call timed out");
                Err(CircuitBreakerError::Timeout(timeout.0))
            }
        }
    }

    /// Force the circuit closed and forget failure history.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        self.transition(&mut inner, CircuitState::Closed);
    }

    fn acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        self.maybe_half_open(&mut inner);

        match inner.state {
            CircuitState::Closed => Some(Permit::new(self, false)),
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                Some(Permit::new(self, true))
            }
            _ => {
                tracing::debug!(breaker = self.name, state = %inner.state, "Circuit breaker rejected call");
                None
            }
        }
    }

    fn maybe_half_open(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Open {
            return;
        }
        let Some(opened_at) = inner.opened_at else {
            return;
        };
        let elapsed = self.clock.now().signed_duration_since(opened_at);
        if elapsed.num_milliseconds() >= self.config.reset_timeout_ms as i64 {
            inner.consecutive_successes = 0;
            inner.trial_in_flight = false;
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures = 0;
        if trial {
            inner.trial_in_flight = false;
        }
        if inner.state == CircuitState::HalfOpen {
            inner.consecutive_successes += 1;
            if inner.consecutive_successes >= self.config.success_threshold {
                inner.consecutive_successes = 0;
                inner.opened_at = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        if trial {
            inner.trial_in_flight = false;
        }
        inner.consecutive_successes = 0;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let should_open = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if should_open {
            inner.opened_at = Some(self.clock.now());
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn abandon(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.trial_in_flight = false;
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;
        metrics::record_circuit_state(self.name, to.gauge_value());
        if to == CircuitState::Open {
            tracing::warn!(breaker = self.name, from = %from, failures = inner.consecutive_failures, "Circuit opened");
        } else {
            tracing::info!(breaker = self.name, from = %from, to = %to, "Circuit state changed");
        }
    }
}

/// Admission ticket for one call. Dropped unsettled, it releases the
/// half-open trial slot without counting a result.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self { breaker, trial, settled: false }
    }

    fn settle(&mut self, success: bool) {
        self.settled = true;
        if success {
            self.breaker.on_success(self.trial);
        } else {
            self.breaker.on_failure(self.trial);
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn breaker(clock: Arc<ManualClock>) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 3,
                success_threshold: 2,
                reset_timeout_ms: 1000,
                timeout_ms: 500,
            },
            clock,
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitBreakerError<&'static str>> {
        cb.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), CircuitBreakerError<&'static str>> {
        cb.call(|| async { Ok::<(), &'static str>(()) }).await
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let cb = breaker(Arc::new(ManualClock::default()));
        for _ in 0..2 {
            assert!(matches!(fail(&cb).await, Err(CircuitBreakerError::Inner("boom"))));
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(Arc::new(ManualClock::default()));
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_open_rejects_without_calling() {
        let clock = Arc::new(ManualClock::default());
        let cb = breaker(clock.clone());
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }

        let calls = &AtomicUsize::new(0);
        let result = cb
            .call(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), &'static str>(())
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        clock.advance(chrono::Duration::milliseconds(999));
        assert!(matches!(succeed(&cb).await, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn test_half_open_closes_after_successes() {
        let clock = Arc::new(ManualClock::default());
        let cb = breaker(clock.clone());
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        clock.advance(chrono::Duration::milliseconds(1000));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let clock = Arc::new(ManualClock::default());
        let cb = breaker(clock.clone());
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        clock.advance(chrono::Duration::seconds(2));
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(succeed(&cb).await, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn test_half_open_admits_one_trial() {
        let clock = Arc::new(ManualClock::default());
        let cb = Arc::new(breaker(clock.clone()));
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        clock.advance(chrono::Duration::seconds(1));

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let trial = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.call(|| async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok::<(), &'static str>(())
                })
                .await
            })
        };
        started_rx.await.unwrap();

        assert!(matches!(succeed(&cb).await, Err(CircuitBreakerError::Open)));
        release_tx.send(()).unwrap();
        trial.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let cb = breaker(Arc::new(ManualClock::default()));
        for _ in 0..3 {
            let result = cb
                .call(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<(), &'static str>(())
                })
                .await;
            assert!(matches!(result, Err(CircuitBreakerError::Timeout(_))));
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_reset_closes() {
        let cb = breaker(Arc::new(ManualClock::default()));
        {
            let mut inner = cb.inner.lock().unwrap();
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Utc::now());
        }
        cb.reset();
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert!(snap.opened_at.is_none());
    }
}
