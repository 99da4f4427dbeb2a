//! Measurement sources.
//!
//! The host's measurement layer (browser observers, synthetic probes, a
//! replayed trace) is a collaborator behind [`VitalsSource`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::fanout::{Subscribers, Subscription};
use crate::vitals::types::{MetricName, RawMetric};

/// Callback receiving raw samples for one metric.
pub type RawMetricHandler = Arc<dyn Fn(RawMetric) + Send + Sync>;

/// Something that reports samples for named metrics.
pub trait VitalsSource: Send + Sync {
    /// Register `handler` for every future sample of `metric`. The handler
    /// stays registered until the returned handle is unsubscribed.
    fn observe(&self, metric: MetricName, handler: RawMetricHandler) -> Subscription;
}

/// A source the host pushes samples into directly.
#[derive(Default)]
pub struct PushSource {
    handlers: Mutex<HashMap<MetricName, Arc<Subscribers<RawMetric>>>>,
}

impl PushSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a sample to every handler observing its metric.
    /// Returns how many handlers received it.
    pub fn report(&self, metric: RawMetric) -> usize {
        let handlers = self
            .handlers
            .lock()
            .expect("push source mutex poisoned")
            .get(&metric.name)
            .cloned();
        let Some(handlers) = handlers else {
            return 0;
        };
        let count = handlers.len();
        let failures = handlers.notify(&metric);
        if failures > 0 {
            tracing::warn!(metric = %metric.name, failures, "Vitals handlers panicked");
        }
        count
    }

    /// Metrics with at least one live handler.
    pub fn observed(&self) -> Vec<MetricName> {
        let mut names: Vec<MetricName> = self
            .handlers
            .lock()
            .expect("push source mutex poisoned")
            .iter()
            .filter(|(_, handlers)| !handlers.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl VitalsSource for PushSource {
    fn observe(&self, metric: MetricName, handler: RawMetricHandler) -> Subscription {
        let handlers = Arc::clone(
            self.handlers
                .lock()
                .expect("push source mutex poisoned")
                .entry(metric)
                .or_default(),
        );
        handlers.subscribe(move |raw: &RawMetric| handler(raw.clone()))
    }
}

impl std::fmt::Debug for PushSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSource").field("observed", &self.observed()).finish()
    }
}
