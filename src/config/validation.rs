//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - URL checks: parseable, HTTPS for every outbound destination
//! - Value ranges for rates, sizes and intervals
//! - Credentials present where a destination needs them
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function of the config
//! - `Error` issues are fatal only in production; elsewhere every issue is
//!   logged as a warning and startup continues

use std::fmt;
use std::net::SocketAddr;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::schema::{Environment, MonitoringConfig};
use crate::tracking::validate_tracking_config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Missing optional settings. Never fatal.
    Warning,
    /// Fatal in production.
    Error,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueSeverity::Warning => f.write_str("warning"),
            IssueSeverity::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub severity: IssueSeverity,
}

impl ValidationError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            severity: IssueSeverity::Error,
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            severity: IssueSeverity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

fn check_https(field: &str, value: &str, issues: &mut Vec<ValidationError>) {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "https" => {}
        Ok(url) => issues.push(ValidationError::error(
            field,
            format!("must use https, got {}", url.scheme()),
        )),
        Err(e) => issues.push(ValidationError::error(field, format!("invalid URL: {e}"))),
    }
}

fn check_rate(field: &str, value: f64, issues: &mut Vec<ValidationError>) {
    if !(0.0..=1.0).contains(&value) {
        issues.push(ValidationError::error(field, format!("{value} is outside [0, 1]")));
    }
}

/// Every problem with `config`, warnings and errors alike.
pub fn validate_config(config: &MonitoringConfig) -> Vec<ValidationError> {
    let mut issues = Vec::new();

    // Logger
    if config.logger.max_entries == 0 {
        issues.push(ValidationError::error("logger.max_entries", "must be at least 1"));
    }

    // Performance
    let perf = &config.performance;
    check_rate("performance.sample_rate", perf.sample_rate, &mut issues);
    if perf.buffer_size == 0 {
        issues.push(ValidationError::error("performance.buffer_size", "must be at least 1"));
    }
    if perf.flush_interval_ms < 100 {
        issues.push(ValidationError::error(
            "performance.flush_interval_ms",
            format!("{} is below the 100ms minimum", perf.flush_interval_ms),
        ));
    }
    for (metric, thresholds) in perf.thresholds.iter() {
        if !thresholds.is_valid() {
            issues.push(ValidationError::error(
                &format!("performance.thresholds.{metric}"),
                "good must be non-negative and below poor",
            ));
        }
    }

    // Error tracking
    let tracking = &config.error_tracking;
    if tracking.enabled {
        if tracking.dsn.is_none() {
            issues.push(ValidationError::warning(
                "error_tracking.dsn",
                "not set; error events stay local",
            ));
        }
        if let Err(e) = validate_tracking_config(tracking) {
            issues.push(ValidationError::error("error_tracking", e.to_string()));
        }
    }

    // Alerting
    let alerting = &config.alerting;
    if alerting.max_alerts_per_hour == 0 || alerting.max_alerts_per_hour > 1000 {
        issues.push(ValidationError::error(
            "alerting.max_alerts_per_hour",
            format!("{} is outside 1..=1000", alerting.max_alerts_per_hour),
        ));
    }
    if alerting.cooldown_minutes > 24 * 60 {
        issues.push(ValidationError::error(
            "alerting.cooldown_minutes",
            "must not exceed one day",
        ));
    }
    for (metric, threshold) in &alerting.thresholds {
        if !(threshold.warning >= 0.0 && threshold.warning < threshold.error) {
            issues.push(ValidationError::error(
                &format!("alerting.thresholds.{metric}"),
                "warning must be non-negative and below error",
            ));
        }
    }
    let channels = &alerting.channels;
    if channels.slack.enabled {
        match &channels.slack.webhook_url {
            Some(url) => check_https("alerting.channels.slack.webhook_url", url, &mut issues),
            None => issues.push(ValidationError::error("alerting.channels.slack.webhook_url", "required when slack is enabled")),
        }
    }
    if channels.webhook.enabled {
        match &channels.webhook.url {
            Some(url) => check_https("alerting.channels.webhook.url", url, &mut issues),
            None => issues.push(ValidationError::error("alerting.channels.webhook.url", "required when the webhook is enabled")),
        }
    }
    if channels.email.enabled {
        if channels.email.recipients.is_empty() {
            issues.push(ValidationError::error("alerting.channels.email.recipients", "required when email is enabled"));
        }
        for recipient in channels.email.recipients.iter().filter(|r| !r.contains('@')) {
            issues.push(ValidationError::error(
                "alerting.channels.email.recipients",
                format!("'{recipient}' is not an email address"),
            ));
        }
    }
    if alerting.enabled && !(channels.slack.enabled || channels.email.enabled || channels.webhook.enabled) {
        issues.push(ValidationError::warning("alerting.channels", "alerting is enabled but no channel is"));
    }

    // Remote logging
    let remote = &config.remote_logging;
    match (&remote.endpoint, remote.enabled) {
        (None, true) => issues.push(ValidationError::error("remote_logging.endpoint", "required when remote logging is enabled")),
        (Some(endpoint), _) => {
            check_https("remote_logging.endpoint", endpoint, &mut issues);
            if remote.api_key.as_deref().map_or(true, str::is_empty) {
                issues.push(ValidationError::error("remote_logging.api_key", "required when an endpoint is set"));
            }
        }
        (None, false) => {}
    }
    if remote.batch_size == 0 || remote.batch_size > remote.max_buffer_size {
        issues.push(ValidationError::error(
            "remote_logging.batch_size",
            format!("{} is outside 1..={}", remote.batch_size, remote.max_buffer_size),
        ));
    }
    if remote.flush_interval_ms != 0 && remote.flush_interval_ms < 1000 {
        issues.push(ValidationError::error(
            "remote_logging.flush_interval_ms",
            "must be 0 (disabled) or at least 1000",
        ));
    }
    if remote.max_retries > 10 {
        issues.push(ValidationError::error("remote_logging.max_retries", "must not exceed 10"));
    }
    if remote.circuit_breaker.failure_threshold == 0 || remote.circuit_breaker.success_threshold == 0 {
        issues.push(ValidationError::error("remote_logging.circuit_breaker", "thresholds must be at least 1"));
    }

    // Diagnostics
    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        issues.push(ValidationError::error(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    issues
}

/// Validate for `environment`. In production any `Error` issue fails the
/// whole config; otherwise every issue is logged and returned.
pub fn check_config(config: &MonitoringConfig) -> Result<Vec<ValidationError>, Vec<ValidationError>> {
    let issues = validate_config(config);
    if config.environment == Environment::Production && issues.iter().any(ValidationError::is_error) {
        return Err(issues.into_iter().filter(ValidationError::is_error).collect());
    }
    for issue in &issues {
        tracing::warn!(
            field = %issue.field,
            severity = %issue.severity,
            environment = %config.environment,
            "Configuration issue: {}",
            issue.message
        );
    }
    Ok(issues)
}
