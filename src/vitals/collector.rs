//! Sampled, buffered web vitals collection with multiple subscribers.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::buffer::RingBuffer;
use crate::fanout::{Subscribers, Subscription};
use crate::observability::metrics;
use crate::vitals::enhancer::MetricEnhancer;
use crate::vitals::source::VitalsSource;
use crate::vitals::types::{EnhancedMetric, RawMetric, VitalsConfig};

/// Uniform draw in `[0, 1)` deciding whether a sample is kept.
pub type Sampler = Arc<dyn Fn() -> f64 + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    #[serde(flatten)]
    pub metrics: VitalsConfig,
    /// Fraction of samples kept, in `[0, 1]`.
    pub sample_rate: f64,
    /// Maximum buffered metrics.
    pub buffer_size: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            metrics: VitalsConfig::default(),
            sample_rate: 1.0,
            buffer_size: 100,
        }
    }
}

pub struct WebVitalsCollector {
    enhancer: Arc<MetricEnhancer>,
    config: CollectorConfig,
    sampler: Sampler,
    buffer: Mutex<RingBuffer<EnhancedMetric>>,
    subscribers: Subscribers<EnhancedMetric>,
}

impl WebVitalsCollector {
    pub fn new(enhancer: Arc<MetricEnhancer>, config: CollectorConfig) -> Self {
        Self::with_sampler(enhancer, config, Arc::new(fastrand::f64))
    }

    pub fn with_sampler(enhancer: Arc<MetricEnhancer>, mut config: CollectorConfig, sampler: Sampler) -> Self {
        if !(0.0..=1.0).contains(&config.sample_rate) {
            tracing::warn!(sample_rate = config.sample_rate, "Collector sample rate out of range, clamping");
            config.sample_rate = if config.sample_rate.is_nan() { 1.0 } else { config.sample_rate.clamp(0.0, 1.0) };
        }
        let buffer = RingBuffer::new(config.buffer_size);
        Self {
            enhancer,
            config,
            sampler,
            buffer: Mutex::new(buffer),
            subscribers: Subscribers::new(),
        }
    }

    /// Attach to a measurement source. Unsubscribe the returned handles to
    /// detach again.
    pub fn start(self: &Arc<Self>, source: &dyn VitalsSource) -> Vec<Subscription> {
        let collector = Arc::downgrade(self);
        self.config
            .metrics
            .enabled()
            .into_iter()
            .map(|name| {
                let collector = collector.clone();
                source.observe(
                    name,
                    Arc::new(move |raw: RawMetric| {
                        if let Some(collector) = collector.upgrade() {
                            collector.record(raw);
                        }
                    }),
                )
            })
            .collect()
    }

    /// Sample, enhance, buffer and fan out one raw metric.
    /// Returns the enhanced metric if the sample was kept.
    pub fn record(&self, raw: RawMetric) -> Option<EnhancedMetric> {
        if (self.sampler)() >= self.config.sample_rate {
            tracing::trace!(metric = %raw.name, "Metric sampled out");
            return None;
        }

        let metric = self.enhancer.enhance(raw);
        let evicted = self
            .buffer
            .lock()
            .expect("collector buffer mutex poisoned")
            .push(metric.clone());
        if evicted.is_some() {
            metrics::record_dropped("vitals_buffer");
        }
        metrics::record_vital(&metric);

        let failures = self.subscribers.notify(&metric);
        if failures > 0 {
            tracing::warn!(metric = %metric.name, failures, "Web vitals subscribers failed");
        }
        Some(metric)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&EnhancedMetric) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn metrics(&self) -> Vec<EnhancedMetric> {
        self.buffer.lock().expect("collector buffer mutex poisoned").to_vec()
    }

    pub fn clear(&self) {
        self.buffer.lock().expect("collector buffer mutex poisoned").clear();
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }
}
