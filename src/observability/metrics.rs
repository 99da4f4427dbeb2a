//! Pipeline metrics.
//!
//! # Metrics
//! - `telemetry_dropped_total` (counter): entries evicted from a bounded
//!   buffer or rejected before delivery, by `buffer`
//! - `telemetry_delivery_failures_total` (counter): failed deliveries, by
//!   `component`
//! - `telemetry_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `telemetry_batches_total` (counter): remote batches, by `outcome`
//! - `telemetry_alerts_total` (counter): alerts created, by `metric`, `severity`
//! - `telemetry_errors_captured_total` (counter): error events, by `outcome`
//! - `telemetry_web_vital` (histogram): enhanced metric values, by `metric`

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::vitals::EnhancedMetric;

/// Install the Prometheus recorder with an HTTP scrape listener.
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> bool {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            tracing::info!(address = %addr, "Prometheus metrics exporter started");
            true
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

pub fn record_dropped(buffer: &'static str) {
    ::metrics::counter!("telemetry_dropped_total", "buffer" => buffer).increment(1);
}

pub fn record_delivery_failure(component: &'static str) {
    ::metrics::counter!("telemetry_delivery_failures_total", "component" => component).increment(1);
}

pub fn record_circuit_state(breaker: &'static str, state: u8) {
    ::metrics::gauge!("telemetry_circuit_state", "breaker" => breaker).set(f64::from(state));
}

pub fn record_batch(outcome: &'static str, entries: usize) {
    ::metrics::counter!("telemetry_batches_total", "outcome" => outcome).increment(1);
    ::metrics::counter!("telemetry_batch_entries_total", "outcome" => outcome).increment(entries as u64);
}

pub fn record_alert(metric: &str, severity: &'static str) {
    ::metrics::counter!(
        "telemetry_alerts_total",
        "metric" => metric.to_string(),
        "severity" => severity
    )
    .increment(1);
}

pub fn record_error_event(outcome: &'static str) {
    ::metrics::counter!("telemetry_errors_captured_total", "outcome" => outcome).increment(1);
}

pub fn record_vital(metric: &EnhancedMetric) {
    ::metrics::histogram!("telemetry_web_vital", "metric" => metric.name.as_str().to_string())
        .record(metric.value);
}
