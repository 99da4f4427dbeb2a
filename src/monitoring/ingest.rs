//! Newline-delimited JSON events fed to the orchestrator.
//!
//! ```text
//! {"kind":"log","level":"warn","message":"slow checkout","context":{"ms":5400}}
//! {"kind":"metric","name":"LCP","value":3100}
//! {"kind":"error","name":"TypeError","message":"x is undefined","stack":"..."}
//! {"kind":"pageview","page":"/pricing","title":"Pricing"}
//! {"kind":"entry","entry":{"type":"custom","timestamp":"...", ...}}
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::logging::{ContextValue, ErrorInfo, LogEntry, LogLevel, PageView};
use crate::monitoring::orchestrator::MonitoringOrchestrator;
use crate::tracking::{CaptureRequest, ErrorLevel};
use crate::vitals::RawMetric;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InputEvent {
    Log {
        #[serde(default = "default_level")]
        level: LogLevel,
        message: String,
        #[serde(default)]
        context: Option<Value>,
    },
    Metric(RawMetric),
    Error {
        #[serde(default = "default_error_name")]
        name: String,
        message: String,
        #[serde(default)]
        stack: Option<String>,
        #[serde(default)]
        level: ErrorLevel,
        #[serde(default)]
        context: Option<Value>,
        #[serde(default)]
        tags: Option<BTreeMap<String, String>>,
    },
    Pageview(PageView),
    /// A fully formed entry shipped straight to the remote logger.
    Entry { entry: LogEntry },
}

fn default_level() -> LogLevel {
    LogLevel::Info
}

fn default_error_name() -> String {
    "Error".to_string()
}

#[derive(Debug, Error)]
#[error("line {line}: {source}")]
pub struct IngestError {
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<InputEvent>, IngestError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|source| IngestError { line: line_no, source })
}

/// Route one event to the matching orchestrator entry point.
pub async fn dispatch(orchestrator: &MonitoringOrchestrator, event: InputEvent) {
    match event {
        InputEvent::Log { level, message, context } => {
            if let Some(logger) = orchestrator.logger() {
                logger.log(level, &message, context.map(ContextValue::from));
            }
        }
        InputEvent::Metric(raw) => {
            orchestrator.report_metric(raw);
        }
        InputEvent::Error {
            name,
            message,
            stack,
            level,
            context,
            tags,
        } => {
            let mut error = ErrorInfo::new(name, message);
            error.stack = stack;
            let request = CaptureRequest {
                error: Some(error),
                level,
                context: context.map(ContextValue::from),
                tags,
                ..CaptureRequest::default()
            };
            orchestrator.capture_error(request).await;
        }
        InputEvent::Pageview(page) => orchestrator.track_page_view(page).await,
        InputEvent::Entry { entry } => orchestrator.send_log_entry(entry),
    }
}
