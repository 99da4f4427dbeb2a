//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Remote transmission:
//!     → retries.rs (attempt, back off base × 2^attempt, give up after max_retries)
//!     → circuit_breaker.rs (fail fast while open, single trial when half-open)
//!     → timeouts.rs (hard deadline on every attempt; expiry counts as failure)
//!     → HttpClient::post
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - An open circuit is never retried; the rejection is the answer
//! - The breaker reads time from the injected clock so tests can step it
//! - Retry exhaustion is a value, not a panic or a propagated error

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::calculate_backoff;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitSnapshot, CircuitState,
};
pub use retries::{retry_with_backoff, RetryOutcome, RetryPolicy};
pub use timeouts::{with_timeout, TimeoutError};
