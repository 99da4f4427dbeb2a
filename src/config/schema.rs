//! Configuration schema definitions.
//!
//! The root [`MonitoringConfig`] groups one section per subsystem. Every
//! section carries `#[serde(default)]`, so a TOML file only needs the keys
//! it changes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::alerting::AlertConfig;
use crate::logging::LoggerConfig;
use crate::performance::PerformanceConfig;
use crate::remote::RemoteLoggerConfig;
use crate::tracking::ErrorTrackingConfig;

/// Deployment environment. Only `Production` turns validation errors
/// into startup failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEnvironment(pub String);

impl fmt::Display for UnknownEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown environment '{}'", self.0)
    }
}

impl std::error::Error for UnknownEnvironment {}

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            _ => Err(UnknownEnvironment(s.to_string())),
        }
    }
}

/// Root configuration for the monitoring pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MonitoringConfig {
    pub environment: Environment,

    /// Structured logger (ring buffer, console mirror).
    pub logger: LoggerConfig,

    /// Web Vitals collection and budgets.
    pub performance: PerformanceConfig,

    pub error_tracking: ErrorTrackingConfig,

    pub alerting: AlertConfig,

    /// Batched shipping of log entries.
    pub remote_logging: RemoteLoggerConfig,

    /// The process's own diagnostics.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or `EnvFilter` directive.
    pub log_level: String,

    /// JSON log lines instead of human-readable output.
    pub json: bool,

    /// Serve a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Sections that replace the resolved configuration wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub environment: Option<Environment>,
    pub logger: Option<LoggerConfig>,
    pub performance: Option<PerformanceConfig>,
    pub error_tracking: Option<ErrorTrackingConfig>,
    pub alerting: Option<AlertConfig>,
    pub remote_logging: Option<RemoteLoggerConfig>,
    pub observability: Option<ObservabilityConfig>,
}

impl MonitoringConfig {
    /// Defaults plus whatever the process environment sets.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable values are
    /// logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(env) = var("APP_ENV") {
            match env.parse() {
                Ok(env) => config.environment = env,
                Err(e) => tracing::warn!(error = %e, "Ignoring APP_ENV"),
            }
        }
        let environment = config.environment.as_str().to_string();
        config.error_tracking.environment = environment.clone();
        config.remote_logging.environment = environment;

        if let Some(version) = var("APP_VERSION") {
            config.remote_logging.version = version.clone();
            config.error_tracking.release = Some(version);
        }

        // Error tracking
        if let Some(dsn) = var("SENTRY_DSN") {
            config.error_tracking.enabled = true;
            config.error_tracking.dsn = Some(dsn);
        }
        if let Some(env) = var("SENTRY_ENVIRONMENT") {
            config.error_tracking.environment = env;
        }
        if let Some(release) = var("SENTRY_RELEASE") {
            config.error_tracking.release = Some(release);
        }
        parse_into(&var, "SENTRY_SAMPLE_RATE", &mut config.error_tracking.sample_rate);

        // Alerting
        if let Some(url) = var("SLACK_WEBHOOK_URL") {
            config.alerting.channels.slack.enabled = true;
            config.alerting.channels.slack.webhook_url = Some(url);
        }
        if let Some(channel) = var("SLACK_CHANNEL") {
            config.alerting.channels.slack.channel = Some(channel);
        }
        if let Some(recipients) = var("ALERT_EMAIL") {
            config.alerting.channels.email.enabled = true;
            config.alerting.channels.email.recipients = recipients
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(from) = var("ALERT_EMAIL_FROM") {
            config.alerting.channels.email.from = from;
        }
        if let Some(url) = var("ALERT_WEBHOOK_URL") {
            config.alerting.channels.webhook.enabled = true;
            config.alerting.channels.webhook.url = Some(url);
        }
        let channels = &config.alerting.channels;
        config.alerting.enabled = channels.slack.enabled || channels.email.enabled || channels.webhook.enabled;
        parse_into(&var, "ALERT_COOLDOWN_MINUTES", &mut config.alerting.cooldown_minutes);
        parse_into(&var, "ALERT_MAX_PER_HOUR", &mut config.alerting.max_alerts_per_hour);

        // Remote logging
        if let Some(endpoint) = var("LOG_ENDPOINT") {
            config.remote_logging.enabled = true;
            config.remote_logging.endpoint = Some(endpoint);
        }
        if let Some(key) = var("LOG_API_KEY") {
            config.remote_logging.api_key = Some(key);
        }
        parse_into(&var, "LOG_BATCH_SIZE", &mut config.remote_logging.batch_size);
        parse_into(&var, "LOG_FLUSH_INTERVAL_MS", &mut config.remote_logging.flush_interval_ms);

        // Diagnostics
        if let Some(level) = var("LOG_LEVEL") {
            config.observability.log_level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            config.observability.json = format.eq_ignore_ascii_case("json");
        }

        config
    }

    /// Replace every section the overrides set.
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(environment) = overrides.environment {
            self.environment = environment;
        }
        if let Some(logger) = overrides.logger {
            self.logger = logger;
        }
        if let Some(performance) = overrides.performance {
            self.performance = performance;
        }
        if let Some(error_tracking) = overrides.error_tracking {
            self.error_tracking = error_tracking;
        }
        if let Some(alerting) = overrides.alerting {
            self.alerting = alerting;
        }
        if let Some(remote_logging) = overrides.remote_logging {
            self.remote_logging = remote_logging;
        }
        if let Some(observability) = overrides.observability {
            self.observability = observability;
        }
    }
}

fn parse_into<T, V>(var: &V, key: &str, target: &mut T)
where
    T: FromStr,
    T::Err: fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(e) => tracing::warn!(key, value = %raw, error = %e, "Ignoring unparseable environment variable"),
        }
    }
}
