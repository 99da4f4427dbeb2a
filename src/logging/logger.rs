//! Structured logger with a bounded buffer and periodic flush.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::RingBuffer;
use crate::clock::{self, SharedClock};
use crate::correlation::CorrelationContext;
use crate::host::SharedHost;
use crate::lifecycle::{spawn_interval, TimerHandle};
use crate::logging::entry::{
    CustomEvent, EntryHeader, ErrorInfo, LogEntry, LogLevel, PageView, PerformanceData,
};
use crate::logging::sanitize::sanitize_context;
use crate::logging::value::ContextValue;
use crate::observability::metrics;

/// Failure reported by a log sink.
#[derive(Debug, Error)]
#[error("log sink failed: {0}")]
pub struct SinkError(pub String);

/// Destination for flushed entries (the remote hook).
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn write_batch(&self, entries: Vec<LogEntry>) -> Result<(), SinkError>;
}

/// Logger settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggerConfig {
    /// Entries below this level are dropped.
    pub min_level: LogLevel,
    /// Ring buffer capacity.
    pub max_entries: usize,
    /// Auto-flush period in milliseconds (0 disables the timer).
    pub flush_interval_ms: u64,
    /// Mirror every entry to the process's own tracing output.
    pub console: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            max_entries: 1000,
            flush_interval_ms: 30_000,
            console: true,
        }
    }
}

pub struct StructuredLogger {
    config: Mutex<LoggerConfig>,
    clock: SharedClock,
    host: SharedHost,
    correlation: CorrelationContext,
    buffer: Mutex<RingBuffer<LogEntry>>,
    remote: Mutex<Option<Arc<dyn LogSink>>>,
    timer: Mutex<Option<TimerHandle>>,
}

impl StructuredLogger {
    pub fn new(
        config: LoggerConfig,
        clock: SharedClock,
        host: SharedHost,
        correlation: CorrelationContext,
    ) -> Self {
        let buffer = RingBuffer::new(config.max_entries);
        Self {
            config: Mutex::new(config),
            clock,
            host,
            correlation,
            buffer: Mutex::new(buffer),
            remote: Mutex::new(None),
            timer: Mutex::new(None),
        }
    }

    /// Build a logger and start its auto-flush timer.
    pub fn start(
        config: LoggerConfig,
        clock: SharedClock,
        host: SharedHost,
        correlation: CorrelationContext,
    ) -> Arc<Self> {
        let logger = Arc::new(Self::new(config, clock, host, correlation));
        logger.start_auto_flush();
        logger
    }

    /// Start (or restart) the periodic flush. The timer holds only a weak
    /// reference, so it never keeps the logger alive.
    pub fn start_auto_flush(self: &Arc<Self>) {
        let period = self.config().flush_interval_ms;
        if period == 0 {
            return;
        }
        let timer = spawn_interval(
            "logger-flush",
            Arc::downgrade(self),
            Duration::from_millis(period),
            |logger: Arc<StructuredLogger>| async move { logger.flush().await },
        );
        *self.timer.lock().expect("logger timer mutex poisoned") = timer;
    }

    /// Attach the remote hook flushed entries are handed to.
    pub fn set_remote(&self, sink: Arc<dyn LogSink>) {
        *self.remote.lock().expect("logger sink mutex poisoned") = Some(sink);
    }

    pub fn config(&self) -> LoggerConfig {
        self.config.lock().expect("logger config mutex poisoned").clone()
    }

    pub fn set_min_level(&self, level: LogLevel) {
        self.config.lock().expect("logger config mutex poisoned").min_level = level;
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.config.lock().expect("logger config mutex poisoned").min_level
    }

    fn header(&self, level: LogLevel, message: &str, context: Option<&ContextValue>) -> EntryHeader {
        EntryHeader {
            timestamp: clock::iso(self.clock.now()),
            level,
            message: message.to_string(),
            correlation_id: self.correlation.current_or_generate(),
            context: context.map(sanitize_context),
        }
    }

    pub fn debug(&self, message: &str, context: Option<ContextValue>) {
        self.log(LogLevel::Debug, message, context);
    }

    pub fn info(&self, message: &str, context: Option<ContextValue>) {
        self.log(LogLevel::Info, message, context);
    }

    pub fn warn(&self, message: &str, context: Option<ContextValue>) {
        self.log(LogLevel::Warn, message, context);
    }

    /// Log an error. `err` is normalized with [`ErrorInfo`]; `None` records
    /// an `undefined` error. The current page URL and user agent are attached.
    pub fn error(&self, message: &str, err: Option<ErrorInfo>, context: Option<ContextValue>) {
        if !self.enabled(LogLevel::Error) {
            return;
        }
        let entry = LogEntry::Error {
            header: self.header(LogLevel::Error, message, context.as_ref()),
            error: err.unwrap_or_else(ErrorInfo::undefined),
            url: self.host.url(),
            user_agent: self.host.user_agent(),
        };
        self.record(entry);
    }

    /// Plain leveled message, recorded as a custom entry without an event.
    pub fn log(&self, level: LogLevel, message: &str, context: Option<ContextValue>) {
        if !self.enabled(level) {
            return;
        }
        let entry = LogEntry::Custom {
            header: self.header(level, message, context.as_ref()),
            event: None,
        };
        self.record(entry);
    }

    pub fn log_performance(&self, message: &str, mut data: PerformanceData) {
        if !self.enabled(LogLevel::Info) {
            return;
        }
        if data.url.is_none() {
            data.url = self.host.url();
        }
        let entry = LogEntry::Performance {
            header: self.header(LogLevel::Info, message, None),
            data,
        };
        self.record(entry);
    }

    pub fn log_page_view(&self, message: &str, mut page: PageView) {
        if !self.enabled(LogLevel::Info) {
            return;
        }
        if page.url.is_none() {
            page.url = self.host.url();
        }
        let entry = LogEntry::Pageview {
            header: self.header(LogLevel::Info, message, None),
            page,
        };
        self.record(entry);
    }

    pub fn log_custom_event(&self, message: &str, mut event: CustomEvent) {
        if !self.enabled(LogLevel::Info) {
            return;
        }
        event.properties = event
            .properties
            .map(|p| crate::logging::sanitize::sanitize_json(&p));
        let entry = LogEntry::Custom {
            header: self.header(LogLevel::Info, message, None),
            event: Some(event),
        };
        self.record(entry);
    }

    fn record(&self, entry: LogEntry) {
        if self.config().console {
            emit_console(&entry);
        }
        let evicted = self
            .buffer
            .lock()
            .expect("logger buffer mutex poisoned")
            .push(entry);
        if evicted.is_some() {
            metrics::record_dropped("log_buffer");
        }
    }

    /// Snapshot of buffered entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.buffer.lock().expect("logger buffer mutex poisoned").to_vec()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().expect("logger buffer mutex poisoned").len()
    }

    /// Hand buffered entries to the remote hook and empty the buffer.
    ///
    /// Never fails: sink errors are logged and the entries are dropped.
    pub async fn flush(&self) {
        let entries = self.buffer.lock().expect("logger buffer mutex poisoned").drain();
        if entries.is_empty() {
            return;
        }
        let sink = self.remote.lock().expect("logger sink mutex poisoned").clone();
        let Some(sink) = sink else {
            tracing::trace!(count = entries.len(), "No remote sink, discarding flushed entries");
            return;
        };
        let count = entries.len();
        if let Err(e) = sink.write_batch(entries).await {
            tracing::warn!(error = %e, count, "Failed to flush log entries");
            metrics::record_delivery_failure("logger");
        }
    }

    /// Stop the timer now and spawn one final flush without waiting for it.
    pub fn destroy(self: &Arc<Self>) {
        if let Some(timer) = self.timer.lock().expect("logger timer mutex poisoned").take() {
            timer.stop();
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let logger = Arc::clone(self);
            handle.spawn(async move { logger.flush().await });
        }
    }
}

impl std::fmt::Debug for StructuredLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredLogger")
            .field("config", &self.config())
            .field("buffered", &self.buffered())
            .finish()
    }
}

fn emit_console(entry: &LogEntry) {
    let header = entry.header();
    let line = entry.to_json_line();
    let correlation_id = header.correlation_id.to_string();
    match header.level {
        LogLevel::Debug => tracing::debug!(target: "telemetry", correlation_id = %correlation_id, kind = entry.kind(), entry = %line, "{}", header.message),
        LogLevel::Info => tracing::info!(target: "telemetry", correlation_id = %correlation_id, kind = entry.kind(), entry = %line, "{}", header.message),
        LogLevel::Warn => tracing::warn!(target: "telemetry", correlation_id = %correlation_id, kind = entry.kind(), entry = %line, "{}", header.message),
        LogLevel::Error => tracing::error!(target: "telemetry", correlation_id = %correlation_id, kind = entry.kind(), entry = %line, "{}", header.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::correlation::CorrelationId;
    use crate::host::{HostSnapshot, StaticHost};
    use crate::logging::sanitize::REDACTED;
    use serde_json::json;

    #[derive(Default)]
    struct CollectingSink {
        batches: Mutex<Vec<Vec<LogEntry>>>,
        fail: bool,
    }

    #[async_trait]
    impl LogSink for CollectingSink {
        async fn write_batch(&self, entries: Vec<LogEntry>) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError("collector down".into()));
            }
            self.batches.lock().unwrap().push(entries);
            Ok(())
        }
    }

    fn logger_with(config: LoggerConfig) -> (StructuredLogger, CorrelationContext) {
        let correlation = CorrelationContext::new();
        let host = Arc::new(StaticHost::new(HostSnapshot {
            url: Some("https://example.com/".into()),
            user_agent: Some("test-agent".into()),
            ..HostSnapshot::default()
        }));
        let logger = StructuredLogger::new(
            LoggerConfig { console: false, ..config },
            Arc::new(ManualClock::default()),
            host,
            correlation.clone(),
        );
        (logger, correlation)
    }

    #[test]
    fn test_min_level_drops_entries() {
        let (logger, _) = logger_with(LoggerConfig { min_level: LogLevel::Warn, ..LoggerConfig::default() });
        logger.debug("d", None);
        logger.info("i", None);
        logger.warn("w", None);
        logger.error("e", None, None);
        let levels: Vec<LogLevel> = logger.entries().iter().map(LogEntry::level).collect();
        assert_eq!(levels, vec![LogLevel::Warn, LogLevel::Error]);
    }

    #[test]
    fn test_uses_current_correlation_id() {
        let (logger, correlation) = logger_with(LoggerConfig::default());
        let id = CorrelationId::generate();
        correlation.set_id(id);
        logger.info("with id", None);
        assert_eq!(logger.entries()[0].header().correlation_id, id);
    }

    #[test]
    fn test_generates_id_when_none_current() {
        let (logger, correlation) = logger_with(LoggerConfig::default());
        logger.info("no id", None);
        let id = logger.entries()[0].header().correlation_id;
        assert!(CorrelationId::validate(&id.to_string()));
        assert!(correlation.get().is_none());
    }

    #[test]
    fn test_context_is_sanitized() {
        let (logger, _) = logger_with(LoggerConfig::default());
        logger.info("login", Some(json!({"user": "ada", "password": "pw"}).into()));
        let ctx = logger.entries()[0].header().context.clone().unwrap();
        assert_eq!(ctx["user"], "ada");
        assert_eq!(ctx["password"], REDACTED);
    }

    #[test]
    fn test_error_entry_records_host() {
        let (logger, _) = logger_with(LoggerConfig::default());
        logger.error("boom", Some(ErrorInfo::new("TypeError", "bad")), None);
        logger.error("missing", None, None);
        let entries = logger.entries();
        match &entries[0] {
            LogEntry::Error { error, url, user_agent, .. } => {
                assert_eq!(error.name, "TypeError");
                assert_eq!(url.as_deref(), Some("https://example.com/"));
                assert_eq!(user_agent.as_deref(), Some("test-agent"));
            }
            other => panic!("unexpected entry {other:?}"),
        }
        match &entries[1] {
            LogEntry::Error { error, .. } => assert_eq!(error.message, "undefined"),
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_payload_helpers_fill_header() {
        let (logger, _) = logger_with(LoggerConfig::default());
        logger.log_page_view("page view", PageView { page: "/".into(), ..PageView::default() });
        logger.log_custom_event(
            "cta",
            CustomEvent {
                name: "signup_click".into(),
                category: Some("cta".into()),
                properties: Some(json!({"plan": "pro", "authToken": "t"})),
            },
        );
        let mut data = PerformanceData::default();
        data.metrics.insert("LCP".into(), 1200.0);
        logger.log_performance("vitals", data);

        let entries = logger.entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.level() == LogLevel::Info));
        match &entries[1] {
            LogEntry::Custom { event: Some(event), .. } => {
                assert_eq!(event.properties.as_ref().unwrap()["authToken"], REDACTED);
            }
            other => panic!("unexpected entry {other:?}"),
        }
        match &entries[2] {
            LogEntry::Performance { data, .. } => assert_eq!(data.url.as_deref(), Some("https://example.com/")),
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_buffer_is_bounded() {
        let (logger, _) = logger_with(LoggerConfig { max_entries: 3, ..LoggerConfig::default() });
        for i in 0..5 {
            logger.info(&format!("m{i}"), None);
        }
        let messages: Vec<String> = logger.entries().iter().map(|e| e.header().message.clone()).collect();
        assert_eq!(messages, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_flush_delivers_and_clears() {
        let (logger, _) = logger_with(LoggerConfig::default());
        let sink = Arc::new(CollectingSink::default());
        logger.set_remote(sink.clone());
        logger.info("a", None);
        logger.info("b", None);
        logger.flush().await;
        assert_eq!(logger.buffered(), 0);
        assert_eq!(sink.batches.lock().unwrap()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_flush_failure_is_swallowed() {
        let (logger, _) = logger_with(LoggerConfig::default());
        logger.set_remote(Arc::new(CollectingSink { fail: true, ..CollectingSink::default() }));
        logger.info("a", None);
        logger.flush().await;
        assert_eq!(logger.buffered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_flush_timer() {
        let sink = Arc::new(CollectingSink::default());
        let logger = StructuredLogger::start(
            LoggerConfig { flush_interval_ms: 1000, console: false, ..LoggerConfig::default() },
            Arc::new(ManualClock::default()),
            Arc::new(StaticHost::default()),
            CorrelationContext::new(),
        );
        logger.set_remote(sink.clone());
        logger.info("tick", None);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(sink.batches.lock().unwrap().len(), 1);

        logger.info("final", None);
        logger.destroy();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.batches.lock().unwrap().len(), 2);
    }
}
