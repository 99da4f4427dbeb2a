//! Serializable status and flush reports.

use serde::Serialize;

use crate::alerting::AlerterStats;
use crate::config::Environment;
use crate::remote::{FlushResult, RemoteLoggerStats};
use crate::tracking::TrackingStats;

/// Outcome of starting one subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "reason")]
pub enum SubsystemState {
    Disabled,
    Running,
    Failed(String),
}

impl SubsystemState {
    pub fn is_running(&self) -> bool {
        matches!(self, SubsystemState::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerStatus {
    pub buffered: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStatus {
    pub started: bool,
    pub buffered: usize,
    pub budget_violations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStatus {
    pub initialized: bool,
    pub environment: Option<Environment>,
    pub logger: Option<LoggerStatus>,
    pub performance: Option<PerformanceStatus>,
    pub error_tracking: SubsystemState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_tracking_stats: Option<TrackingStats>,
    pub alerting: SubsystemState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerting_stats: Option<AlerterStats>,
    pub remote_logging: SubsystemState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_logging_stats: Option<RemoteLoggerStats>,
}

impl MonitoringStatus {
    pub fn uninitialized() -> Self {
        Self {
            initialized: false,
            environment: None,
            logger: None,
            performance: None,
            error_tracking: SubsystemState::Disabled,
            error_tracking_stats: None,
            alerting: SubsystemState::Disabled,
            alerting_stats: None,
            remote_logging: SubsystemState::Disabled,
            remote_logging_stats: None,
        }
    }
}

/// What one orchestrator flush did. Each field is `None` when the
/// subsystem is not running.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub logger_entries: Option<usize>,
    /// Metrics delivered, or the delivery error.
    pub performance: Option<Result<usize, String>>,
    pub error_tracking: Option<bool>,
    pub remote_logging: Option<FlushResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_value(SubsystemState::Failed("bad dsn".into())).unwrap(),
            serde_json::json!({ "state": "failed", "reason": "bad dsn" })
        );
        assert_eq!(
            serde_json::to_value(SubsystemState::Running).unwrap(),
            serde_json::json!({ "state": "running" })
        );
    }

    #[test]
    fn test_uninitialized_status() {
        let status = serde_json::to_value(MonitoringStatus::uninitialized()).unwrap();
        assert_eq!(status["initialized"], false);
        assert!(status.get("remoteLoggingStats").is_none());
    }
}
