//! Remote logging types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logging::{LogEntry, LogLevel};
use crate::resilience::{CircuitBreakerConfig, CircuitState, RetryPolicy};

/// Where an entry originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    #[default]
    Client,
    Server,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Client => "client",
            LogSource::Server => "server",
        }
    }
}

/// A log entry re-shaped for transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLogEntry {
    #[serde(flatten)]
    pub entry: LogEntry,
    pub source: LogSource,
    pub environment: String,
}

impl RemoteLogEntry {
    pub fn level(&self) -> LogLevel {
        self.entry.level()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub source: LogSource,
    pub version: String,
    pub environment: String,
}

/// The unit POSTed to the log endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogBatch {
    pub id: Uuid,
    pub timestamp: String,
    pub entries: Vec<RemoteLogEntry>,
    pub metadata: BatchMetadata,
}

/// Remote logger settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLoggerConfig {
    pub enabled: bool,
    /// HTTPS endpoint receiving batches.
    pub endpoint: Option<String>,
    /// Sent as `Authorization: Bearer <api_key>`.
    pub api_key: Option<String>,
    /// Buffered entries that trigger a flush.
    pub batch_size: usize,
    /// Auto-flush period in milliseconds (0 disables the timer).
    pub flush_interval_ms: u64,
    /// Upper bound on buffered entries between flushes.
    pub max_buffer_size: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub source: LogSource,
    pub environment: String,
    pub version: String,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for RemoteLoggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key: None,
            batch_size: 50,
            flush_interval_ms: 10_000,
            max_buffer_size: 1000,
            max_retries: 3,
            retry_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            source: LogSource::Client,
            environment: "development".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl RemoteLoggerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_ms: self.retry_backoff_ms,
            max_delay_ms: self.max_backoff_ms,
            jitter: false,
        }
    }
}

/// Structured result of one flush.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "status")]
pub enum FlushResult {
    /// Nothing buffered, or the logger is disabled.
    Empty,
    Sent {
        batch_id: Uuid,
        entries: usize,
        attempts: u32,
    },
    /// The batch was dropped after the final attempt.
    Failed {
        batch_id: Uuid,
        entries: usize,
        attempts: u32,
        error: String,
    },
}

impl FlushResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, FlushResult::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLoggerStats {
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub entries_sent: u64,
    pub entries_dropped: u64,
    pub buffered: usize,
    pub circuit_state: Option<CircuitState>,
}
