//! Log entry types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::correlation::CorrelationId;

/// Severity of a log entry. Ordered: `Debug < Info < Warn < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Fields every entry carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryHeader {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    pub correlation_id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Normalized error shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,
}

impl ErrorInfo {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            component_stack: None,
        }
    }

    /// Normalize a Rust error. The name is the error's type name; the
    /// `source()` chain is rendered as the stack.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        let full = std::any::type_name::<E>();
        let name = if full.starts_with("dyn ") {
            "Error".to_string()
        } else {
            short_type_name(full)
        };

        let mut frames = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            frames.push(format!("    caused by: {cause}"));
            source = cause.source();
        }

        Self {
            name,
            message: err.to_string(),
            stack: if frames.is_empty() { None } else { Some(frames.join("\n")) },
            component_stack: None,
        }
    }

    /// Anything that is not an error object.
    pub fn from_display(value: impl fmt::Display) -> Self {
        Self::new("Unknown", value.to_string())
    }

    pub fn null() -> Self {
        Self::new("Unknown", "null")
    }

    pub fn undefined() -> Self {
        Self::new("Unknown", "undefined")
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_component_stack(mut self, stack: impl Into<String>) -> Self {
        self.component_stack = Some(stack.into());
        self
    }
}

fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Performance payload: named measurements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceData {
    pub metrics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Page-view payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub page: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Custom event payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEvent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

/// A structured log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogEntry {
    Performance {
        #[serde(flatten)]
        header: EntryHeader,
        #[serde(flatten)]
        data: PerformanceData,
    },
    Error {
        #[serde(flatten)]
        header: EntryHeader,
        error: ErrorInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, rename = "userAgent", skip_serializing_if = "Option::is_none")]
        user_agent: Option<String>,
    },
    Pageview {
        #[serde(flatten)]
        header: EntryHeader,
        #[serde(flatten)]
        page: PageView,
    },
    Custom {
        #[serde(flatten)]
        header: EntryHeader,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<CustomEvent>,
    },
}

impl LogEntry {
    pub fn header(&self) -> &EntryHeader {
        match self {
            LogEntry::Performance { header, .. }
            | LogEntry::Error { header, .. }
            | LogEntry::Pageview { header, .. }
            | LogEntry::Custom { header, .. } => header,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.header().level
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LogEntry::Performance { .. } => "performance",
            LogEntry::Error { .. } => "error",
            LogEntry::Pageview { .. } => "pageview",
            LogEntry::Custom { .. } => "custom",
        }
    }

    /// Serialize to one JSON line. Never fails: a serializer error produces
    /// a custom entry describing it instead.
    pub fn to_json_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(line) => line,
            Err(e) => {
                let header = self.header();
                let fallback = LogEntry::Custom {
                    header: EntryHeader {
                        timestamp: header.timestamp.clone(),
                        level: LogLevel::Error,
                        message: "Log entry serialization failed".to_string(),
                        correlation_id: header.correlation_id,
                        context: Some(serde_json::json!({
                            "error": e.to_string(),
                            "originalMessage": header.message,
                            "originalType": self.kind(),
                        })),
                    },
                    event: None,
                };
                serde_json::to_string(&fallback).unwrap_or_else(|_| {
                    format!(
                        r#"{{"type":"custom","level":"error","message":"Log entry serialization failed","correlationId":"{}"}}"#,
                        header.correlation_id
                    )
                })
            }
        }
    }
}
