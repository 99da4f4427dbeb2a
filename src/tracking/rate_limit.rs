//! Per-fingerprint rate limiting.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::clock::SharedClock;
use crate::tracking::types::RateLimitConfig;

/// Timestamps of accepted events inside the current window.
#[derive(Debug, Default)]
struct SlidingWindow {
    accepted: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        while let Some(oldest) = self.accepted.front() {
            if now.signed_duration_since(*oldest) >= window {
                self.accepted.pop_front();
            } else {
                break;
            }
        }
    }

    fn try_acquire(&mut self, now: DateTime<Utc>, window: Duration, max: usize) -> bool {
        self.prune(now, window);
        if self.accepted.len() < max {
            self.accepted.push_back(now);
            true
        } else {
            false
        }
    }
}

/// At most `max_events` per rolling window for each fingerprint key.
#[derive(Debug)]
pub struct FingerprintRateLimiter {
    config: RateLimitConfig,
    clock: SharedClock,
    windows: DashMap<String, SlidingWindow>,
}

impl FingerprintRateLimiter {
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            windows: DashMap::new(),
        }
    }

    fn window(&self) -> Duration {
        Duration::milliseconds(self.config.window_ms as i64)
    }

    /// Record an event for `key`; false when it is over the limit.
    pub fn check(&self, key: &str) -> bool {
        let now = self.clock.now();
        let window = self.window();
        let mut entry = self.windows.entry(key.to_string()).or_default();
        entry.try_acquire(now, window, self.config.max_events)
    }

    /// Drop keys whose windows have fully expired.
    pub fn purge(&self) {
        let now = self.clock.now();
        let window = self.window();
        self.windows.retain(|_, w| {
            w.prune(now, window);
            !w.accepted.is_empty()
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
