//! Error tracking types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::correlation::CorrelationId;
use crate::logging::ErrorInfo;

/// Event severity, as understood by Sentry-style backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Fatal,
    #[default]
    Error,
    Warning,
    Info,
    Debug,
}

impl ErrorLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorLevel::Fatal => "fatal",
            ErrorLevel::Error => "error",
            ErrorLevel::Warning => "warning",
            ErrorLevel::Info => "info",
            ErrorLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub message: String,
    #[serde(default)]
    pub level: ErrorLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A captured error, ready for the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub id: Uuid,
    pub timestamp: String,
    pub correlation_id: CorrelationId,
    pub message: String,
    pub level: ErrorLevel,
    pub error: ErrorInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    pub fingerprint: Vec<String>,
}

/// What the caller hands to `capture_error`; the service fills in the rest.
#[derive(Debug, Clone, Default)]
pub struct CaptureRequest {
    pub error: Option<ErrorInfo>,
    /// Defaults to the error's message.
    pub message: Option<String>,
    pub level: ErrorLevel,
    pub context: Option<crate::logging::ContextValue>,
    pub tags: Option<BTreeMap<String, String>>,
}

impl CaptureRequest {
    pub fn error(error: ErrorInfo) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: crate::logging::ContextValue) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_level(mut self, level: ErrorLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.get_or_insert_with(BTreeMap::new).insert(key.into(), value.into());
        self
    }
}

/// Per-fingerprint rate limit window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_events: usize,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_events: 5,
            window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorTrackingConfig {
    pub enabled: bool,
    /// `https://<key>@<host>/<project>`.
    pub dsn: Option<String>,
    pub environment: String,
    pub release: Option<String>,
    /// Fraction of events forwarded, in `[0, 1]`.
    pub sample_rate: f64,
    pub max_breadcrumbs: usize,
    /// Events whose message contains any of these are dropped.
    pub ignore_errors: Vec<String>,
    pub rate_limit: RateLimitConfig,
}

impl Default for ErrorTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dsn: None,
            environment: "development".to_string(),
            release: None,
            sample_rate: 1.0,
            max_breadcrumbs: 100,
            ignore_errors: Vec::new(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("invalid DSN '{0}': must be an https URL containing '@'")]
    InvalidDsn(String),

    #[error("sample rate {0} outside [0, 1]")]
    InvalidSampleRate(f64),

    #[error("unknown environment '{0}'")]
    InvalidEnvironment(String),

    #[error("error sink failed: {0}")]
    Sink(String),
}

pub type TrackingResult<T> = Result<T, TrackingError>;
