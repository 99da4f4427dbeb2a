//! Threshold evaluation, cooldown and hourly cap.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::alerting::channels::AlertDispatcher;
use crate::alerting::types::{
    AlertConfig, AlertDeliveryReport, AlertError, AlertSeverity, AlertThreshold, AlerterStats,
    PerformanceAlert,
};
use crate::clock::{self, SharedClock};
use crate::lifecycle::{spawn_interval, TimerHandle};
use crate::observability::metrics;
use crate::vitals::{EnhancedMetric, MetricName};

const HOUSEKEEPING_INTERVAL: StdDuration = StdDuration::from_secs(5 * 60);
const COOLDOWN_RETENTION_HOURS: i64 = 24;

/// Severity of `value` against `threshold`, or `None` below warning.
/// Values at twice the error bound or more are critical.
pub fn alert_severity(value: f64, threshold: &AlertThreshold) -> Option<AlertSeverity> {
    if value >= threshold.error * 2.0 {
        Some(AlertSeverity::Critical)
    } else if value >= threshold.error {
        Some(AlertSeverity::Error)
    } else if value >= threshold.warning {
        Some(AlertSeverity::Warning)
    } else {
        None
    }
}

/// Cooldown as a signed duration. Values too large for chrono saturate.
fn cooldown_window(minutes: u64) -> Duration {
    i64::try_from(minutes)
        .ok()
        .and_then(Duration::try_minutes)
        .unwrap_or(Duration::MAX)
}

/// Whether `metric` should produce an alert right now.
pub fn should_trigger(
    metric: &EnhancedMetric,
    config: &AlertConfig,
    cooldowns: &HashMap<MetricName, DateTime<Utc>>,
    alerts_last_hour: usize,
    now: DateTime<Utc>,
) -> bool {
    if !config.enabled {
        return false;
    }
    let Some(threshold) = config.thresholds.get(&metric.name) else {
        return false;
    };
    if alert_severity(metric.value, threshold).is_none() {
        return false;
    }
    if let Some(last) = cooldowns.get(&metric.name) {
        let cooldown = cooldown_window(config.cooldown_minutes);
        if now.signed_duration_since(*last) < cooldown {
            return false;
        }
    }
    alerts_last_hour < config.max_alerts_per_hour as usize
}

/// Build the alert for `metric`. Fails when the metric has no threshold
/// or sits below its warning bound.
pub fn create_alert(
    metric: &EnhancedMetric,
    thresholds: &BTreeMap<MetricName, AlertThreshold>,
    now: DateTime<Utc>,
) -> Result<PerformanceAlert, AlertError> {
    let threshold = thresholds
        .get(&metric.name)
        .ok_or_else(|| AlertError::MissingThreshold(metric.name.clone()))?;
    let severity = alert_severity(metric.value, threshold).ok_or_else(|| AlertError::BelowThreshold {
        metric: metric.name.clone(),
        value: metric.value,
    })?;
    let bound = match severity {
        AlertSeverity::Warning => threshold.warning,
        AlertSeverity::Error | AlertSeverity::Critical => threshold.error,
    };

    Ok(PerformanceAlert {
        id: Uuid::new_v4(),
        timestamp: clock::iso(now),
        correlation_id: metric.correlation_id.clone(),
        metric: metric.name.clone(),
        value: metric.value,
        threshold: bound,
        severity,
        url: metric.url.clone(),
        user_agent: metric.user_agent.clone(),
        context: Some(serde_json::json!({
            "rating": metric.rating,
            "delta": metric.delta,
            "connectionType": metric.connection_type,
            "deviceMemory": metric.device_memory,
        })),
    })
}

#[derive(Debug, Default)]
struct AlertState {
    /// Last alert time per metric.
    cooldowns: HashMap<MetricName, DateTime<Utc>>,
    /// Creation time of every alert in the trailing hour, oldest first.
    recent: VecDeque<DateTime<Utc>>,
    total: u64,
}

impl AlertState {
    fn alerts_last_hour(&self, now: DateTime<Utc>) -> usize {
        let hour = Duration::hours(1);
        self.recent
            .iter()
            .filter(|t| now.signed_duration_since(**t) < hour)
            .count()
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> (usize, usize) {
        let hour = Duration::hours(1);
        let before = self.recent.len();
        while let Some(oldest) = self.recent.front() {
            if now.signed_duration_since(*oldest) >= hour {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        let retention = Duration::hours(COOLDOWN_RETENTION_HOURS);
        let cooldowns_before = self.cooldowns.len();
        self.cooldowns
            .retain(|_, last| now.signed_duration_since(*last) < retention);
        (before - self.recent.len(), cooldowns_before - self.cooldowns.len())
    }
}

/// Evaluates metrics against alert thresholds and delivers the alerts that
/// pass the cooldown and hourly cap.
pub struct PerformanceAlerter {
    config: ArcSwap<AlertConfig>,
    dispatcher: AlertDispatcher,
    clock: SharedClock,
    state: Mutex<AlertState>,
    housekeeping: Mutex<Option<TimerHandle>>,
}

impl PerformanceAlerter {
    pub fn new(config: AlertConfig, dispatcher: AlertDispatcher, clock: SharedClock) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            dispatcher,
            clock,
            state: Mutex::new(AlertState::default()),
            housekeeping: Mutex::new(None),
        }
    }

    /// Construct and start the periodic housekeeping sweep.
    pub fn start(config: AlertConfig, dispatcher: AlertDispatcher, clock: SharedClock) -> Arc<Self> {
        let alerter = Arc::new(Self::new(config, dispatcher, clock));
        alerter.start_housekeeping();
        alerter
    }

    pub fn start_housekeeping(self: &Arc<Self>) {
        let handle = spawn_interval(
            "alert-housekeeping",
            Arc::downgrade(self),
            HOUSEKEEPING_INTERVAL,
            |alerter: Arc<Self>| async move {
                alerter.sweep();
            },
        );
        *self.housekeeping.lock().expect("alerter timer mutex poisoned") = handle;
    }

    pub fn config(&self) -> Arc<AlertConfig> {
        self.config.load_full()
    }

    /// Swap in a new configuration. Cooldown and hourly history are kept.
    pub fn update_config(&self, config: AlertConfig) {
        tracing::info!(
            enabled = config.enabled,
            metrics = config.thresholds.len(),
            "Alert configuration updated"
        );
        self.config.store(Arc::new(config));
    }

    /// Create an alert for `metric` if policy allows, recording it against
    /// the cooldown and hourly cap.
    pub fn evaluate(&self, metric: &EnhancedMetric) -> Option<PerformanceAlert> {
        let config = self.config.load();
        let now = self.clock.now();
        let mut state = self.state.lock().expect("alerter state mutex poisoned");

        let alerts_last_hour = state.alerts_last_hour(now);
        if !should_trigger(metric, &config, &state.cooldowns, alerts_last_hour, now) {
            return None;
        }

        match create_alert(metric, &config.thresholds, now) {
            Ok(alert) => {
                state.cooldowns.insert(metric.name.clone(), now);
                state.recent.push_back(now);
                state.total += 1;
                metrics::record_alert(alert.metric.as_str(), alert.severity.as_str());
                tracing::info!(
                    metric = %alert.metric,
                    value = alert.value,
                    threshold = alert.threshold,
                    severity = %alert.severity,
                    "Performance alert created"
                );
                Some(alert)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Alert not created");
                None
            }
        }
    }

    /// Evaluate and, when an alert is created, deliver it. Channel failures
    /// are reported in the returned report, never raised.
    pub async fn process_metric(&self, metric: &EnhancedMetric) -> Option<AlertDeliveryReport> {
        let alert = self.evaluate(metric)?;
        let config = self.config.load_full();
        Some(self.dispatcher.deliver(alert, &config.channels).await)
    }

    /// Evict hourly history older than an hour and cooldowns older than a day.
    pub fn sweep(&self) {
        let now = self.clock.now();
        let (recent, cooldowns) = self.state.lock().expect("alerter state mutex poisoned").sweep(now);
        if recent > 0 || cooldowns > 0 {
            tracing::debug!(recent, cooldowns, "Alert history swept");
        }
    }

    pub fn stats(&self) -> AlerterStats {
        let config = self.config.load();
        let now = self.clock.now();
        let state = self.state.lock().expect("alerter state mutex poisoned");
        let cooldown = cooldown_window(config.cooldown_minutes);
        AlerterStats {
            enabled: config.enabled,
            alerts_last_hour: state.alerts_last_hour(now),
            metrics_in_cooldown: state
                .cooldowns
                .values()
                .filter(|last| now.signed_duration_since(**last) < cooldown)
                .count(),
            total_alerts: state.total,
        }
    }

    pub fn destroy(&self) {
        self.housekeeping.lock().expect("alerter timer mutex poisoned").take();
    }
}

impl std::fmt::Debug for PerformanceAlerter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceAlerter")
            .field("stats", &self.stats())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::types::{AlertChannels, WebhookChannelConfig};
    use crate::clock::{Clock, ManualClock};
    use crate::correlation::CorrelationId;
    use crate::remote::{HttpClient, HttpResponse, TransportError};
    use crate::vitals::Rating;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHttp(AtomicUsize);

    #[async_trait]
    impl HttpClient for CountingHttp {
        async fn post(&self, _: &str, _: &Value, _: &[(String, String)]) -> Result<HttpResponse, TransportError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Network("connection refused".into()))
        }
    }

    fn metric(name: MetricName, value: f64) -> EnhancedMetric {
        EnhancedMetric {
            name,
            value,
            rating: Rating::Poor,
            delta: None,
            id: None,
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            url: "https://example.com/".into(),
            user_agent: "test".into(),
            correlation_id: CorrelationId::generate(),
            device_memory: None,
            connection_type: None,
        }
    }

    fn enabled() -> AlertConfig {
        AlertConfig {
            enabled: true,
            ..AlertConfig::default()
        }
    }

    fn alerter(config: AlertConfig) -> (PerformanceAlerter, Arc<ManualClock>, Arc<CountingHttp>) {
        let clock = Arc::new(ManualClock::default());
        let http = Arc::new(CountingHttp(AtomicUsize::new(0)));
        let alerter = PerformanceAlerter::new(config, AlertDispatcher::new(http.clone()), clock.clone());
        (alerter, clock, http)
    }

    #[test]
    fn test_severity_levels() {
        let t = AlertThreshold { warning: 2500.0, error: 4000.0 };
        assert_eq!(alert_severity(2000.0, &t), None);
        assert_eq!(alert_severity(2500.0, &t), Some(AlertSeverity::Warning));
        assert_eq!(alert_severity(4000.0, &t), Some(AlertSeverity::Error));
        assert_eq!(alert_severity(7999.0, &t), Some(AlertSeverity::Error));
        assert_eq!(alert_severity(8000.0, &t), Some(AlertSeverity::Critical));
    }

    #[test]
    fn test_create_alert_errors() {
        let thresholds = enabled().thresholds;
        let now = Utc::now();
        assert_eq!(
            create_alert(&metric(MetricName::from("custom"), 1.0), &thresholds, now),
            Err(AlertError::MissingThreshold(MetricName::from("custom")))
        );
        assert!(matches!(
            create_alert(&metric(MetricName::Lcp, 100.0), &thresholds, now),
            Err(AlertError::BelowThreshold { .. })
        ));

        let alert = create_alert(&metric(MetricName::Lcp, 9000.0), &thresholds, now).unwrap();
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.threshold, 4000.0);
        let alert = create_alert(&metric(MetricName::Lcp, 3000.0), &thresholds, now).unwrap();
        assert_eq!(alert.threshold, 2500.0);
    }

    #[test]
    fn test_disabled_never_triggers() {
        let (alerter, _, _) = alerter(AlertConfig::default());
        assert!(alerter.evaluate(&metric(MetricName::Lcp, 9000.0)).is_none());
    }

    #[test]
    fn test_cooldown_per_metric() {
        let (alerter, clock, _) = alerter(enabled());
        assert!(alerter.evaluate(&metric(MetricName::Lcp, 5000.0)).is_some());
        assert!(alerter.evaluate(&metric(MetricName::Lcp, 5000.0)).is_none());
        assert!(alerter.evaluate(&metric(MetricName::Cls, 0.5)).is_some());
        assert_eq!(alerter.stats().metrics_in_cooldown, 2);

        clock.advance(Duration::minutes(14));
        assert!(alerter.evaluate(&metric(MetricName::Lcp, 5000.0)).is_none());
        clock.advance(Duration::minutes(1));
        assert!(alerter.evaluate(&metric(MetricName::Lcp, 5000.0)).is_some());
    }

    #[test]
    fn test_huge_cooldown_saturates() {
        let config = AlertConfig {
            cooldown_minutes: 1 << 60,
            ..enabled()
        };
        let (alerter, clock, _) = alerter(config);
        assert!(alerter.evaluate(&metric(MetricName::Lcp, 5000.0)).is_some());
        clock.advance(Duration::days(365));
        assert!(alerter.evaluate(&metric(MetricName::Lcp, 5000.0)).is_none());
        assert_eq!(alerter.stats().metrics_in_cooldown, 1);

        alerter.update_config(AlertConfig {
            cooldown_minutes: u64::MAX,
            ..enabled()
        });
        assert_eq!(alerter.stats().metrics_in_cooldown, 1);
        assert_eq!(cooldown_window(u64::MAX), Duration::MAX);
        assert_eq!(cooldown_window(15), Duration::minutes(15));
    }

    #[test]
    fn test_hourly_cap_is_rolling() {
        let config = AlertConfig {
            cooldown_minutes: 0,
            max_alerts_per_hour: 3,
            ..enabled()
        };
        let (alerter, clock, _) = alerter(config);

        for _ in 0..3 {
            assert!(alerter.evaluate(&metric(MetricName::Inp, 900.0)).is_some());
            clock.advance(Duration::minutes(10));
        }
        assert!(alerter.evaluate(&metric(MetricName::Inp, 900.0)).is_none());
        assert_eq!(alerter.stats().alerts_last_hour, 3);

        // First alert was at t=0; at t=60 it leaves the window.
        clock.advance(Duration::minutes(30));
        assert!(alerter.evaluate(&metric(MetricName::Inp, 900.0)).is_some());
        assert!(alerter.evaluate(&metric(MetricName::Inp, 900.0)).is_none());
    }

    #[test]
    fn test_sweep_bounds_history() {
        let (alerter, clock, _) = alerter(enabled());
        alerter.evaluate(&metric(MetricName::Lcp, 5000.0));
        alerter.evaluate(&metric(MetricName::Ttfb, 5000.0));

        clock.advance(Duration::hours(2));
        alerter.sweep();
        {
            let state = alerter.state.lock().unwrap();
            assert!(state.recent.is_empty());
            assert_eq!(state.cooldowns.len(), 2);
        }

        clock.advance(Duration::hours(23));
        alerter.sweep();
        assert!(alerter.state.lock().unwrap().cooldowns.is_empty());
        assert_eq!(alerter.stats().total_alerts, 2);
    }

    #[test]
    fn test_update_config_applies_new_thresholds() {
        let (alerter, _, _) = alerter(enabled());
        assert!(alerter.evaluate(&metric(MetricName::Fcp, 2000.0)).is_some());

        let mut config = enabled();
        config.thresholds.insert(MetricName::Ttfb, AlertThreshold { warning: 5000.0, error: 9000.0 });
        alerter.update_config(config);
        assert!(alerter.evaluate(&metric(MetricName::Ttfb, 2000.0)).is_none());
        assert_eq!(alerter.config().thresholds[&MetricName::Ttfb].warning, 5000.0);
    }

    #[tokio::test]
    async fn test_process_metric_reports_channel_failure() {
        let config = AlertConfig {
            channels: AlertChannels {
                webhook: WebhookChannelConfig {
                    enabled: true,
                    url: Some("https://hooks.example.com/perf".into()),
                    ..WebhookChannelConfig::default()
                },
                ..AlertChannels::default()
            },
            ..enabled()
        };
        let (alerter, _, http) = alerter(config);

        let report = alerter.process_metric(&metric(MetricName::Lcp, 4500.0)).await.unwrap();
        assert_eq!(report.alert.severity, AlertSeverity::Error);
        assert_eq!(report.delivered(), 0);
        assert_eq!(http.0.load(Ordering::SeqCst), 1);
        assert!(alerter.process_metric(&metric(MetricName::Lcp, 4500.0)).await.is_none());
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_hourly_cap(
            steps in proptest::collection::vec((0i64..20, 0usize..5), 1..80),
            cap in 1u32..6,
        ) {
            let config = AlertConfig { cooldown_minutes: 0, max_alerts_per_hour: cap, ..enabled() };
            let (alerter, clock, _) = alerter(config);
            let mut created: Vec<DateTime<Utc>> = Vec::new();
            for (minutes, which) in steps {
                clock.advance(Duration::minutes(minutes));
                let name = MetricName::CORE[which].clone();
                if alerter.evaluate(&metric(name, 1e9)).is_some() {
                    created.push(clock.now());
                }
                let now = clock.now();
                let in_window = created
                    .iter()
                    .filter(|t| now.signed_duration_since(**t) < Duration::hours(1))
                    .count();
                prop_assert!(in_window <= cap as usize);
            }
        }
    }
}
