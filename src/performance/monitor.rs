//! Performance monitor lifecycle, buffering and reporting.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::RingBuffer;
use crate::fanout::{Subscribers, Subscription};
use crate::lifecycle::{spawn_interval, TimerHandle};
use crate::observability::metrics;
use crate::performance::budget::{calculate_budget_violations, BudgetViolation};
use crate::vitals::{
    EnhancedMetric, MetricEnhancer, RatingThresholds, Thresholds, VitalsConfig, VitalsSource,
};

pub const MIN_FLUSH_INTERVAL_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("metrics delivery failed: {0}")]
    Delivery(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;

/// Where flushed metrics go.
#[async_trait]
pub trait MetricsReporter: Send + Sync {
    async fn report(&self, metrics: &[EnhancedMetric], violations: &[BudgetViolation]) -> MonitorResult<()>;
}

/// Reporter that only writes a diagnostic event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

#[async_trait]
impl MetricsReporter for TracingReporter {
    async fn report(&self, metrics: &[EnhancedMetric], violations: &[BudgetViolation]) -> MonitorResult<()> {
        tracing::info!(
            metrics = metrics.len(),
            violations = violations.len(),
            "Performance metrics flushed"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub vitals: VitalsConfig,
    /// Fraction of samples kept, in `[0, 1]`.
    pub sample_rate: f64,
    pub buffer_size: usize,
    /// Auto-flush period, at least 100ms.
    pub flush_interval_ms: u64,
    pub thresholds: RatingThresholds,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vitals: VitalsConfig::default(),
            sample_rate: 1.0,
            buffer_size: 100,
            flush_interval_ms: 30_000,
            thresholds: RatingThresholds::default(),
        }
    }
}

/// Clamp or default every out-of-range field.
///
/// Returns the corrected config and one message per correction. The
/// monitor stays constructible whatever it is given.
pub fn validate_config(mut config: PerformanceConfig) -> (PerformanceConfig, Vec<String>) {
    let defaults = PerformanceConfig::default();
    let mut corrections = Vec::new();

    if !(0.0..=1.0).contains(&config.sample_rate) {
        let fixed = if config.sample_rate.is_nan() { defaults.sample_rate } else { config.sample_rate.clamp(0.0, 1.0) };
        corrections.push(format!("sample_rate {} out of [0, 1], using {}", config.sample_rate, fixed));
        config.sample_rate = fixed;
    }

    if config.buffer_size < 1 {
        corrections.push(format!("buffer_size must be at least 1, using {}", defaults.buffer_size));
        config.buffer_size = defaults.buffer_size;
    }

    if config.flush_interval_ms < MIN_FLUSH_INTERVAL_MS {
        corrections.push(format!(
            "flush_interval_ms {} below {}, using {}",
            config.flush_interval_ms, MIN_FLUSH_INTERVAL_MS, MIN_FLUSH_INTERVAL_MS
        ));
        config.flush_interval_ms = MIN_FLUSH_INTERVAL_MS;
    }

    let invalid: Vec<_> = config
        .thresholds
        .iter()
        .filter(|(_, t)| !t.is_valid())
        .map(|(name, t)| (name.clone(), *t))
        .collect();
    for (name, bad) in invalid {
        match crate::vitals::rating::default_thresholds(&name) {
            Some(default) => {
                corrections.push(format!(
                    "{name} thresholds good={} poor={} invalid, using good={} poor={}",
                    bad.good, bad.poor, default.good, default.poor
                ));
                config.thresholds.set(name, default);
            }
            None => {
                corrections.push(format!("{name} thresholds good={} poor={} invalid, removed", bad.good, bad.poor));
                config.thresholds.remove(&name);
            }
        }
    }

    (config, corrections)
}

#[derive(Debug, Default)]
struct Lifecycle {
    started: bool,
    /// Bumped on every start so handlers from an earlier run go quiet.
    generation: u64,
    timer: Option<TimerHandle>,
    /// Handlers registered on the vitals source for the current run.
    subscriptions: Vec<Subscription>,
}

/// Clears the in-flight flag when a flush finishes or is cancelled.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Collects enhanced metrics while started, fans them out and ships them
/// on flush.
pub struct PerformanceMonitor {
    config: PerformanceConfig,
    enhancer: Arc<MetricEnhancer>,
    source: Arc<dyn VitalsSource>,
    reporter: Arc<dyn MetricsReporter>,
    sampler: Arc<dyn Fn() -> f64 + Send + Sync>,
    lifecycle: Mutex<Lifecycle>,
    buffer: Mutex<RingBuffer<(u64, EnhancedMetric)>>,
    next_seq: AtomicU64,
    flushing: AtomicBool,
    subscribers: Subscribers<EnhancedMetric>,
}

impl PerformanceMonitor {
    pub fn new(
        config: PerformanceConfig,
        enhancer: Arc<MetricEnhancer>,
        source: Arc<dyn VitalsSource>,
        reporter: Arc<dyn MetricsReporter>,
    ) -> Self {
        let (config, corrections) = validate_config(config);
        for correction in &corrections {
            tracing::warn!(correction = %correction, "Performance monitor config corrected");
        }
        enhancer.set_thresholds(config.thresholds.clone());
        let buffer = RingBuffer::new(config.buffer_size);
        Self {
            config,
            enhancer,
            source,
            reporter,
            sampler: Arc::new(fastrand::f64),
            lifecycle: Mutex::new(Lifecycle::default()),
            buffer: Mutex::new(buffer),
            next_seq: AtomicU64::new(1),
            flushing: AtomicBool::new(false),
            subscribers: Subscribers::new(),
        }
    }

    /// Replace the sample draw (tests).
    pub fn with_sampler(mut self, sampler: Arc<dyn Fn() -> f64 + Send + Sync>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle.lock().expect("monitor lifecycle mutex poisoned").started
    }

    /// Subscribe to the source and begin auto-flush. No-op when already
    /// started or disabled.
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            tracing::debug!("Performance monitoring disabled");
            return;
        }
        let generation = {
            let mut lifecycle = self.lifecycle.lock().expect("monitor lifecycle mutex poisoned");
            if lifecycle.started {
                return;
            }
            lifecycle.started = true;
            lifecycle.generation += 1;
            lifecycle.generation
        };

        let monitor = Arc::downgrade(self);
        let subscriptions = self.enhancer.setup(
            self.source.as_ref(),
            &self.config.vitals,
            Arc::new(move |metric| {
                if let Some(monitor) = monitor.upgrade() {
                    if monitor.is_current(generation) {
                        monitor.record(metric);
                    }
                }
            }),
        );

        let timer = spawn_interval(
            "performance-flush",
            Arc::downgrade(self),
            Duration::from_millis(self.config.flush_interval_ms),
            |monitor: Arc<PerformanceMonitor>| async move {
                if let Err(e) = monitor.flush().await {
                    tracing::warn!(error = %e, "Scheduled performance flush failed");
                }
            },
        );
        {
            let mut lifecycle = self.lifecycle.lock().expect("monitor lifecycle mutex poisoned");
            if lifecycle.started && lifecycle.generation == generation {
                lifecycle.timer = timer;
                lifecycle.subscriptions = subscriptions;
            } else {
                // Stopped while subscribing.
                for subscription in subscriptions {
                    subscription.unsubscribe();
                }
                return;
            }
        }
        tracing::info!(metrics = ?self.config.vitals.enabled(), "Performance monitoring started");
    }

    /// Stop delivery and the timer, then start one last flush without
    /// waiting for it. No-op when already stopped.
    pub fn stop(self: &Arc<Self>) {
        let (timer, subscriptions) = {
            let mut lifecycle = self.lifecycle.lock().expect("monitor lifecycle mutex poisoned");
            if !lifecycle.started {
                return;
            }
            lifecycle.started = false;
            (lifecycle.timer.take(), std::mem::take(&mut lifecycle.subscriptions))
        };
        drop(timer);
        for subscription in subscriptions {
            subscription.unsubscribe();
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let monitor = Arc::clone(self);
            handle.spawn(async move {
                if let Err(e) = monitor.flush().await {
                    tracing::warn!(error = %e, "Final performance flush failed");
                }
            });
        }
        tracing::info!("Performance monitoring stopped");
    }

    fn is_current(&self, generation: u64) -> bool {
        let lifecycle = self.lifecycle.lock().expect("monitor lifecycle mutex poisoned");
        lifecycle.started && lifecycle.generation == generation
    }

    /// Buffer one enhanced metric and deliver it to every callback.
    /// Samples outside the sample rate are discarded.
    pub fn record(&self, metric: EnhancedMetric) {
        if (self.sampler)() >= self.config.sample_rate {
            return;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let evicted = self
            .buffer
            .lock()
            .expect("monitor buffer mutex poisoned")
            .push((seq, metric.clone()));
        if evicted.is_some() {
            metrics::record_dropped("performance_buffer");
        }
        metrics::record_vital(&metric);
        self.subscribers.notify(&metric);
    }

    /// Register a callback; the handle removes only this callback.
    pub fn on_metric<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&EnhancedMetric) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn get_metrics(&self) -> Vec<EnhancedMetric> {
        self.buffer
            .lock()
            .expect("monitor buffer mutex poisoned")
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn clear_metrics(&self) {
        self.buffer.lock().expect("monitor buffer mutex poisoned").clear();
    }

    pub fn thresholds(&self) -> &RatingThresholds {
        &self.config.thresholds
    }

    pub fn threshold_for(&self, metric: &crate::vitals::MetricName) -> Option<Thresholds> {
        self.config.thresholds.get(metric)
    }

    /// Budget violations among the currently buffered metrics.
    pub fn budget_violations(&self) -> Vec<BudgetViolation> {
        calculate_budget_violations(&self.get_metrics(), &self.config.thresholds)
    }

    /// Report buffered metrics, then remove what was reported.
    ///
    /// Unlike the structured logger, delivery failure is returned to the
    /// caller and the buffer is left intact so the flush can be retried.
    /// Metrics that arrive while the report is in flight are kept. A flush
    /// that overlaps one already in flight reports nothing and returns 0.
    pub async fn flush(&self) -> MonitorResult<usize> {
        if self.flushing.swap(true, Ordering::AcqRel) {
            tracing::debug!("Performance flush already in flight");
            return Ok(0);
        }
        let _guard = FlushGuard(&self.flushing);

        let (snapshot, last_seq) = {
            let buffer = self.buffer.lock().expect("monitor buffer mutex poisoned");
            let last_seq = buffer.iter().map(|(seq, _)| *seq).max();
            (buffer.iter().map(|(_, m)| m.clone()).collect::<Vec<_>>(), last_seq)
        };
        let Some(last_seq) = last_seq else {
            return Ok(0);
        };

        let violations = calculate_budget_violations(&snapshot, &self.config.thresholds);
        if let Err(e) = self.reporter.report(&snapshot, &violations).await {
            metrics::record_delivery_failure("performance_monitor");
            return Err(e);
        }

        let mut buffer = self.buffer.lock().expect("monitor buffer mutex poisoned");
        let remaining: Vec<_> = buffer.drain().into_iter().filter(|(seq, _)| *seq > last_seq).collect();
        for item in remaining {
            buffer.push(item);
        }
        Ok(snapshot.len())
    }
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("started", &self.is_started())
            .field("buffered", &self.buffer.lock().expect("monitor buffer mutex poisoned").len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
