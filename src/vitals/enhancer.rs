//! Raw sample → enhanced metric.

use std::sync::{Arc, RwLock};

use crate::clock::{self, SharedClock};
use crate::correlation::CorrelationContext;
use crate::fanout::Subscription;
use crate::host::SharedHost;
use crate::vitals::rating::RatingThresholds;
use crate::vitals::source::VitalsSource;
use crate::vitals::types::{EnhancedMetric, RawMetric, VitalsConfig};

/// Callback receiving enhanced metrics.
pub type MetricCallback = Arc<dyn Fn(EnhancedMetric) + Send + Sync>;

#[derive(Debug)]
pub struct MetricEnhancer {
    clock: SharedClock,
    host: SharedHost,
    correlation: CorrelationContext,
    thresholds: RwLock<RatingThresholds>,
}

impl MetricEnhancer {
    pub fn new(clock: SharedClock, host: SharedHost, correlation: CorrelationContext) -> Self {
        Self::with_thresholds(clock, host, correlation, RatingThresholds::default())
    }

    pub fn with_thresholds(
        clock: SharedClock,
        host: SharedHost,
        correlation: CorrelationContext,
        thresholds: RatingThresholds,
    ) -> Self {
        Self {
            clock,
            host,
            correlation,
            thresholds: RwLock::new(thresholds),
        }
    }

    pub fn thresholds(&self) -> RatingThresholds {
        self.thresholds.read().expect("thresholds lock poisoned").clone()
    }

    pub fn set_thresholds(&self, thresholds: RatingThresholds) {
        *self.thresholds.write().expect("thresholds lock poisoned") = thresholds;
    }

    /// Fill in rating, timestamp and context. A rating supplied by the
    /// source is kept; otherwise it is computed from the thresholds.
    pub fn enhance(&self, raw: RawMetric) -> EnhancedMetric {
        let rating = raw.rating.unwrap_or_else(|| {
            self.thresholds
                .read()
                .expect("thresholds lock poisoned")
                .rate(&raw.name, raw.value)
        });

        EnhancedMetric {
            name: raw.name,
            value: raw.value,
            rating,
            delta: raw.delta,
            id: raw.id,
            timestamp: clock::iso(self.clock.now()),
            url: self.host.url().unwrap_or_default(),
            user_agent: self.host.user_agent().unwrap_or_default(),
            correlation_id: self.correlation.current_or_generate(),
            device_memory: self.host.device_memory(),
            connection_type: self.host.connection_type(),
        }
    }

    /// Subscribe to every enabled metric on `source`, forwarding enhanced
    /// samples to `callback`. Unsubscribe the returned handles to detach.
    pub fn setup(
        self: &Arc<Self>,
        source: &dyn VitalsSource,
        config: &VitalsConfig,
        callback: MetricCallback,
    ) -> Vec<Subscription> {
        let enabled = config.enabled();
        tracing::debug!(metrics = ?enabled, "Subscribing to web vitals");
        enabled
            .into_iter()
            .map(|name| {
                let enhancer = Arc::clone(self);
                let callback = Arc::clone(&callback);
                source.observe(
                    name,
                    Arc::new(move |raw: RawMetric| callback(enhancer.enhance(raw))),
                )
            })
            .collect()
    }
}
