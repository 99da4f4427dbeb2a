//! Structured logging subsystem.
//!
//! # Data Flow
//! ```text
//! debug/info/warn/error, log_performance/log_page_view/log_custom_event
//!     → level gate (entries below min_level are dropped here)
//!     → entry.rs (timestamp, level, message, correlation id)
//!     → sanitize.rs (redact secrets, mark functions and cycles)
//!     → console sink (tracing event) + ring buffer
//!     → flush → remote hook (wired by the orchestrator)
//! ```
//!
//! # Design Decisions
//! - Every entry is independently serializable; serialization falls back to
//!   a descriptive entry instead of failing
//! - Flush failures are logged and swallowed, logging never breaks the caller
//! - The auto-flush timer holds only a weak reference to the logger

pub mod entry;
pub mod logger;
pub mod sanitize;
pub mod value;

pub use entry::{
    CustomEvent, EntryHeader, ErrorInfo, LogEntry, LogLevel, PageView, PerformanceData,
};
pub use logger::{LogSink, LoggerConfig, SinkError, StructuredLogger};
pub use sanitize::{is_sensitive_key, sanitize_context, sanitize_json, CIRCULAR, FUNCTION, REDACTED};
pub use value::{ContextObject, ContextValue};
