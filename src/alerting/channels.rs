//! Alert delivery channels.
//!
//! Each enabled channel gets its own future; they run concurrently and a
//! failure on one is reported in its [`ChannelOutcome`] without affecting
//! the others.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{json, Value};

use crate::alerting::types::{
    AlertChannels, AlertDeliveryReport, AlertSeverity, ChannelError, ChannelKind, ChannelOutcome,
    EmailChannelConfig, PerformanceAlert, SlackChannelConfig, WebhookChannelConfig,
};
use crate::observability::metrics;
use crate::remote::{json_headers, HttpClient};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Outbound mail collaborator (SMTP relay, provider API, ...).
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), ChannelError>;
}

fn severity_emoji(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Warning => ":warning:",
        AlertSeverity::Error => ":red_circle:",
        AlertSeverity::Critical => ":rotating_light:",
    }
}

fn format_value(alert: &PerformanceAlert) -> String {
    let unit = alert.metric.unit();
    if unit.is_empty() {
        format!("{:.3}", alert.value)
    } else {
        format!("{:.0}{unit}", alert.value)
    }
}

fn headline(alert: &PerformanceAlert) -> String {
    format!(
        "{} performance alert: {} is {} (threshold {})",
        alert.severity.as_str().to_uppercase(),
        alert.metric,
        format_value(alert),
        alert.threshold
    )
}

pub fn slack_payload(alert: &PerformanceAlert, config: &SlackChannelConfig) -> Value {
    let mut payload = json!({
        "text": headline(alert),
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("{} {} alert", severity_emoji(alert.severity), alert.metric),
                    "emoji": true
                }
            },
            {
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Metric:*\n{}", alert.metric) },
                    { "type": "mrkdwn", "text": format!("*Value:*\n{}", format_value(alert)) },
                    { "type": "mrkdwn", "text": format!("*Threshold:*\n{}", alert.threshold) },
                    { "type": "mrkdwn", "text": format!("*Severity:*\n{}", alert.severity) }
                ]
            },
            {
                "type": "context",
                "elements": [
                    { "type": "mrkdwn", "text": format!("Page: {}", alert.url) },
                    { "type": "mrkdwn", "text": format!("Correlation: {}", alert.correlation_id) }
                ]
            }
        ]
    });
    if let Some(channel) = &config.channel {
        payload["channel"] = Value::String(channel.clone());
    }
    payload
}

pub fn email_message(alert: &PerformanceAlert, config: &EmailChannelConfig) -> EmailMessage {
    let body = format!(
        "{}\n\nMetric: {}\nValue: {}\nThreshold: {}\nSeverity: {}\nPage: {}\nUser agent: {}\nTime: {}\nCorrelation ID: {}\nAlert ID: {}\n",
        headline(alert),
        alert.metric,
        format_value(alert),
        alert.threshold,
        alert.severity,
        alert.url,
        alert.user_agent,
        alert.timestamp,
        alert.correlation_id,
        alert.id,
    );
    EmailMessage {
        from: config.from.clone(),
        to: config.recipients.clone(),
        subject: format!("[{}] {} performance alert", alert.severity.as_str().to_uppercase(), alert.metric),
        body,
    }
}

pub fn webhook_payload(alert: &PerformanceAlert) -> Value {
    json!({
        "type": "performance_alert",
        "alert": alert,
    })
}

/// Sends alerts to every enabled channel.
#[derive(Clone)]
pub struct AlertDispatcher {
    http: Arc<dyn HttpClient>,
    email: Option<Arc<dyn EmailTransport>>,
}

impl AlertDispatcher {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http, email: None }
    }

    pub fn with_email(mut self, transport: Arc<dyn EmailTransport>) -> Self {
        self.email = Some(transport);
        self
    }

    async fn send_slack(&self, alert: &PerformanceAlert, config: &SlackChannelConfig) -> Result<(), ChannelError> {
        let url = config.webhook_url.as_deref().ok_or(ChannelError::NotConfigured("slack"))?;
        self.http
            .post(url, &slack_payload(alert, config), &json_headers(None))
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn send_email(&self, alert: &PerformanceAlert, config: &EmailChannelConfig) -> Result<(), ChannelError> {
        if config.recipients.is_empty() {
            return Err(ChannelError::NotConfigured("email"));
        }
        let transport = self.email.as_ref().ok_or(ChannelError::NotConfigured("email"))?;
        transport.send(email_message(alert, config)).await
    }

    async fn send_webhook(&self, alert: &PerformanceAlert, config: &WebhookChannelConfig) -> Result<(), ChannelError> {
        let url = config.url.as_deref().ok_or(ChannelError::NotConfigured("webhook"))?;
        let mut headers = json_headers(None);
        headers.extend(config.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.http
            .post(url, &webhook_payload(alert), &headers)
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Deliver `alert` to all enabled channels concurrently.
    pub async fn deliver(&self, alert: PerformanceAlert, channels: &AlertChannels) -> AlertDeliveryReport {
        let mut sends: Vec<(ChannelKind, BoxFuture<'_, Result<(), ChannelError>>)> = Vec::new();
        if channels.slack.enabled {
            sends.push((ChannelKind::Slack, self.send_slack(&alert, &channels.slack).boxed()));
        }
        if channels.email.enabled {
            sends.push((ChannelKind::Email, self.send_email(&alert, &channels.email).boxed()));
        }
        if channels.webhook.enabled {
            sends.push((ChannelKind::Webhook, self.send_webhook(&alert, &channels.webhook).boxed()));
        }

        let (kinds, futures): (Vec<_>, Vec<_>) = sends.into_iter().unzip();
        let results = join_all(futures).await;

        let outcomes = kinds
            .into_iter()
            .zip(results)
            .map(|(channel, result)| match result {
                Ok(()) => ChannelOutcome {
                    channel,
                    delivered: true,
                    error: None,
                },
                Err(e) => {
                    metrics::record_delivery_failure(channel.as_str());
                    tracing::warn!(
                        channel = channel.as_str(),
                        alert_id = %alert.id,
                        error = %e,
                        "Alert delivery failed"
                    );
                    ChannelOutcome {
                        channel,
                        delivered: false,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();

        AlertDeliveryReport { alert, outcomes }
    }
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("email_transport", &self.email.is_some())
            .finish()
    }
}
