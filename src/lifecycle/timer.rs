//! Periodic background tasks bound to a component's lifetime.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time;

use crate::lifecycle::shutdown::Shutdown;

/// Owns a running interval task. Stopping or dropping the handle ends it.
#[derive(Debug)]
pub struct TimerHandle {
    name: &'static str,
    shutdown: Shutdown,
    join: JoinHandle<()>,
}

impl TimerHandle {
    /// Stop the timer. Takes effect immediately; an in-flight tick is cancelled.
    pub fn stop(self) {
        // Drop does the work.
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.shutdown.trigger();
        self.join.abort();
        tracing::trace!(timer = self.name, "Timer stopped");
    }
}

/// Run `tick(target)` every `period` until the handle is dropped or the
/// target itself is dropped.
///
/// The first tick fires one full period after spawning. Returns `None` when
/// called outside a Tokio runtime.
pub fn spawn_interval<T, F, Fut>(
    name: &'static str,
    target: Weak<T>,
    period: Duration,
    tick: F,
) -> Option<TimerHandle>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let handle = match Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            tracing::debug!(timer = name, "No async runtime, periodic task not started");
            return None;
        }
    };

    let shutdown = Shutdown::new();
    let mut stop = shutdown.subscribe();
    let join = handle.spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(target) = target.upgrade() else {
                        break;
                    };
                    tick(target).await;
                }
                _ = stop.recv() => {
                    break;
                }
            }
        }
    });

    Some(TimerHandle { name, shutdown, join })
}
