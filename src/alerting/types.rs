//! Alerting data types and configuration.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::correlation::CorrelationId;
use crate::vitals::{default_thresholds, MetricName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert bounds for one metric. A value at or above `warning` alerts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThreshold {
    pub warning: f64,
    pub error: f64,
}

/// Warning/error bounds per metric, defaulting to the rating table's
/// good/poor values for the five core metrics.
pub fn default_alert_thresholds() -> BTreeMap<MetricName, AlertThreshold> {
    MetricName::CORE
        .iter()
        .filter_map(|name| {
            default_thresholds(name).map(|t| {
                (
                    name.clone(),
                    AlertThreshold {
                        warning: t.good,
                        error: t.poor,
                    },
                )
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackChannelConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailChannelConfig {
    pub enabled: bool,
    pub recipients: Vec<String>,
    pub from: String,
}

impl Default for EmailChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            recipients: Vec::new(),
            from: "alerts@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookChannelConfig {
    pub enabled: bool,
    pub url: Option<String>,
    /// Extra headers sent with every webhook POST.
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertChannels {
    pub slack: SlackChannelConfig,
    pub email: EmailChannelConfig,
    pub webhook: WebhookChannelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub cooldown_minutes: u64,
    pub max_alerts_per_hour: u32,
    pub thresholds: BTreeMap<MetricName, AlertThreshold>,
    pub channels: AlertChannels,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cooldown_minutes: 15,
            max_alerts_per_hour: 10,
            thresholds: default_alert_thresholds(),
            channels: AlertChannels::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAlert {
    pub id: Uuid,
    pub timestamp: String,
    pub correlation_id: CorrelationId,
    pub metric: MetricName,
    pub value: f64,
    pub threshold: f64,
    pub severity: AlertSeverity,
    pub url: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Slack,
    Email,
    Webhook,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Slack => "slack",
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOutcome {
    pub channel: ChannelKind,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-channel results of delivering one alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDeliveryReport {
    pub alert: PerformanceAlert,
    pub outcomes: Vec<ChannelOutcome>,
}

impl AlertDeliveryReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ChannelOutcome> {
        self.outcomes.iter().filter(|o| !o.delivered)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlerterStats {
    pub enabled: bool,
    pub alerts_last_hour: usize,
    pub metrics_in_cooldown: usize,
    pub total_alerts: u64,
}

#[derive(Debug, Error, PartialEq)]
pub enum AlertError {
    #[error("no threshold configured for metric {0}")]
    MissingThreshold(MetricName),

    #[error("{metric} value {value} is below its warning threshold")]
    BelowThreshold { metric: MetricName, value: f64 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChannelError {
    #[error("{0} channel has no destination configured")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Transport(#[from] crate::remote::TransportError),

    #[error("email transport failed: {0}")]
    Email(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_mirror_ratings() {
        let thresholds = default_alert_thresholds();
        assert_eq!(thresholds.len(), 5);
        assert_eq!(thresholds[&MetricName::Lcp], AlertThreshold { warning: 2500.0, error: 4000.0 });
        assert_eq!(thresholds[&MetricName::Cls], AlertThreshold { warning: 0.1, error: 0.25 });
    }

    #[test]
    fn test_config_from_toml() {
        let config: AlertConfig = toml::from_str(
            r#"
            enabled = true
            cooldown_minutes = 5

            [thresholds.LCP]
            warning = 3000
            error = 5000

            [channels.slack]
            enabled = true
            webhook_url = "https://hooks.slack.com/services/T/B/X"
            "#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.cooldown_minutes, 5);
        assert_eq!(config.max_alerts_per_hour, 10);
        assert_eq!(config.thresholds.len(), 1);
        assert_eq!(config.thresholds[&MetricName::Lcp].error, 5000.0);
        assert!(config.channels.slack.enabled);
        assert!(!config.channels.email.enabled);
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(serde_json::to_value(AlertSeverity::Critical).unwrap(), "critical");
    }
}
