//! Batching remote logger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::buffer::RingBuffer;
use crate::clock::{self, SharedClock};
use crate::lifecycle::{spawn_interval, TimerHandle};
use crate::logging::{sanitize_json, LogEntry, LogSink, SinkError};
use crate::observability::metrics;
use crate::remote::transport::{json_headers, HttpClient, HttpResponse, TransportError};
use crate::remote::types::{
    BatchMetadata, FlushResult, LogBatch, RemoteLogEntry, RemoteLoggerConfig, RemoteLoggerStats,
};
use crate::resilience::{retry_with_backoff, CircuitBreaker, CircuitBreakerError, CircuitState};

#[derive(Debug, Default)]
struct Counters {
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    entries_sent: AtomicU64,
    entries_dropped: AtomicU64,
}

pub struct RemoteLogger {
    config: RemoteLoggerConfig,
    client: Arc<dyn HttpClient>,
    clock: SharedClock,
    breaker: CircuitBreaker,
    buffer: Mutex<RingBuffer<RemoteLogEntry>>,
    counters: Counters,
    timer: Mutex<Option<TimerHandle>>,
}

impl RemoteLogger {
    pub fn new(config: RemoteLoggerConfig, client: Arc<dyn HttpClient>, clock: SharedClock) -> Self {
        let breaker = CircuitBreaker::new("remote_logger", config.circuit_breaker.clone(), clock.clone());
        let buffer = RingBuffer::new(config.max_buffer_size.max(config.batch_size));
        Self {
            config,
            client,
            clock,
            breaker,
            buffer: Mutex::new(buffer),
            counters: Counters::default(),
            timer: Mutex::new(None),
        }
    }

    /// Build a logger and start its periodic flush.
    pub fn start(config: RemoteLoggerConfig, client: Arc<dyn HttpClient>, clock: SharedClock) -> Arc<Self> {
        let logger = Arc::new(Self::new(config, client, clock));
        logger.start_auto_flush();
        logger
    }

    pub fn start_auto_flush(self: &Arc<Self>) {
        if !self.config.enabled || self.config.flush_interval_ms == 0 {
            return;
        }
        let timer = spawn_interval(
            "remote-log-flush",
            Arc::downgrade(self),
            Duration::from_millis(self.config.flush_interval_ms),
            |logger: Arc<RemoteLogger>| async move {
                logger.flush().await;
            },
        );
        *self.timer.lock().expect("remote logger timer mutex poisoned") = timer;
    }

    pub fn config(&self) -> &RemoteLoggerConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Queue one entry. Reaching `batch_size` starts a background flush.
    pub fn send_log_entry(self: &Arc<Self>, entry: LogEntry) {
        if self.enqueue(entry) {
            self.spawn_flush();
        }
    }

    /// Queue several entries, flushing at most once.
    pub fn send_log_entries<I>(self: &Arc<Self>, entries: I)
    where
        I: IntoIterator<Item = LogEntry>,
    {
        let mut due = false;
        for entry in entries {
            due |= self.enqueue(entry);
        }
        if due {
            self.spawn_flush();
        }
    }

    /// Returns true when the buffer has reached `batch_size`.
    fn enqueue(&self, entry: LogEntry) -> bool {
        if !self.config.enabled {
            return false;
        }
        let remote = self.to_remote(entry);
        let mut buffer = self.buffer.lock().expect("remote logger buffer mutex poisoned");
        if buffer.push(remote).is_some() {
            self.counters.entries_dropped.fetch_add(1, Ordering::Relaxed);
            metrics::record_dropped("remote_buffer");
        }
        buffer.len() >= self.config.batch_size
    }

    fn to_remote(&self, mut entry: LogEntry) -> RemoteLogEntry {
        let header = match &mut entry {
            LogEntry::Performance { header, .. }
            | LogEntry::Error { header, .. }
            | LogEntry::Pageview { header, .. }
            | LogEntry::Custom { header, .. } => header,
        };
        header.context = header.context.as_ref().map(sanitize_json);
        RemoteLogEntry {
            entry,
            source: self.config.source,
            environment: self.config.environment.clone(),
        }
    }

    fn spawn_flush(self: &Arc<Self>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let logger = Arc::clone(self);
                handle.spawn(async move {
                    logger.flush().await;
                });
            }
            Err(_) => {
                tracing::debug!("No async runtime, batch stays buffered until the next flush");
            }
        }
    }

    /// Send everything buffered as one batch.
    ///
    /// The buffer is emptied before transmission starts, so concurrent
    /// flushes never send the same entry twice. A batch that still fails
    /// after the last retry is dropped.
    pub async fn flush(&self) -> FlushResult {
        let entries = self.buffer.lock().expect("remote logger buffer mutex poisoned").drain();
        if entries.is_empty() {
            return FlushResult::Empty;
        }

        let count = entries.len();
        let batch = LogBatch {
            id: Uuid::new_v4(),
            timestamp: clock::iso(self.clock.now()),
            entries,
            metadata: BatchMetadata {
                source: self.config.source,
                version: self.config.version.clone(),
                environment: self.config.environment.clone(),
            },
        };
        let batch_id = batch.id;

        match self.transmit(&batch).await {
            Ok(attempts) => {
                self.counters.batches_sent.fetch_add(1, Ordering::Relaxed);
                self.counters.entries_sent.fetch_add(count as u64, Ordering::Relaxed);
                metrics::record_batch("sent", count);
                tracing::debug!(batch_id = %batch_id, entries = count, attempts, "Log batch delivered");
                FlushResult::Sent { batch_id, entries: count, attempts }
            }
            Err((error, attempts)) => {
                self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                self.counters.entries_dropped.fetch_add(count as u64, Ordering::Relaxed);
                metrics::record_batch("failed", count);
                metrics::record_delivery_failure("remote_logger");
                tracing::warn!(
                    batch_id = %batch_id,
                    entries = count,
                    attempts,
                    error = %error,
                    "Failed to deliver log batch, dropping it"
                );
                FlushResult::Failed {
                    batch_id,
                    entries: count,
                    attempts,
                    error: error.to_string(),
                }
            }
        }
    }

    async fn transmit(&self, batch: &LogBatch) -> Result<u32, (CircuitBreakerError<TransportError>, u32)> {
        let Some(endpoint) = self.config.endpoint.as_deref() else {
            return Err((CircuitBreakerError::Inner(TransportError::NotConfigured), 0));
        };
        let body = serde_json::to_value(batch)
            .map_err(|e| (CircuitBreakerError::Inner(TransportError::Encode(e.to_string())), 0))?;
        let headers = json_headers(self.config.api_key.as_deref());

        let (body, headers, this) = (&body, &headers, self);
        let outcome = retry_with_backoff(
            &self.config.retry_policy(),
            move |attempt| async move {
                if attempt > 0 {
                    tracing::debug!(attempt, "Retrying log batch");
                }
                this.breaker
                    .call(move || this.post(endpoint, body, headers))
                    .await
            },
            CircuitBreakerError::was_attempted,
        )
        .await;

        match outcome.result {
            Ok(_) => Ok(outcome.attempts),
            Err(e) => Err((e, outcome.attempts)),
        }
    }

    async fn post(&self, endpoint: &str, body: &Value, headers: &[(String, String)]) -> Result<HttpResponse, TransportError> {
        self.client.post(endpoint, body, headers).await?.error_for_status()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().expect("remote logger buffer mutex poisoned").len()
    }

    pub fn stats(&self) -> RemoteLoggerStats {
        RemoteLoggerStats {
            batches_sent: self.counters.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.counters.batches_failed.load(Ordering::Relaxed),
            entries_sent: self.counters.entries_sent.load(Ordering::Relaxed),
            entries_dropped: self.counters.entries_dropped.load(Ordering::Relaxed),
            buffered: self.buffered(),
            circuit_state: Some(self.circuit_state()),
        }
    }

    /// Stop the timer and start one last flush without waiting for it.
    pub fn destroy(self: &Arc<Self>) {
        if let Some(timer) = self.timer.lock().expect("remote logger timer mutex poisoned").take() {
            timer.stop();
        }
        if self.buffered() > 0 {
            self.spawn_flush();
        }
    }
}

#[async_trait]
impl LogSink for RemoteLogger {
    /// Queue the batch for the next remote flush. Only a full buffer
    /// forces delivery here, so the remote flush outcome stays with the
    /// caller of [`RemoteLogger::flush`].
    async fn write_batch(&self, entries: Vec<LogEntry>) -> Result<(), SinkError> {
        let mut due = false;
        for entry in entries {
            due |= self.enqueue(entry);
        }
        if !due {
            return Ok(());
        }
        match self.flush().await {
            FlushResult::Failed { error, .. } => Err(SinkError(error)),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for RemoteLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLogger")
            .field("endpoint", &self.config.endpoint)
            .field("buffered", &self.buffered())
            .field("circuit", &self.breaker.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::correlation::CorrelationId;
    use crate::logging::{EntryHeader, LogLevel};
    use crate::resilience::CircuitBreakerConfig;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakeClient {
        fail_first: usize,
        calls: AtomicUsize,
        bodies: Mutex<Vec<Value>>,
        headers: Mutex<Vec<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl HttpClient for FakeClient {
        async fn post(&self, _url: &str, body: &Value, headers: &[(String, String)]) -> Result<HttpResponse, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies.lock().unwrap().push(body.clone());
            self.headers.lock().unwrap().push(headers.to_vec());
            if n < self.fail_first {
                Ok(HttpResponse::from_status(500, "Internal Server Error"))
            } else {
                Ok(HttpResponse::from_status(200, "OK"))
            }
        }
    }

    fn entry(message: &str) -> LogEntry {
        LogEntry::Custom {
            header: EntryHeader {
                timestamp: "2024-01-01T00:00:00.000Z".into(),
                level: LogLevel::Info,
                message: message.into(),
                correlation_id: CorrelationId::generate(),
                context: Some(serde_json::json!({"apiKey": "abc", "page": "/"})),
            },
            event: None,
        }
    }

    fn config() -> RemoteLoggerConfig {
        RemoteLoggerConfig {
            enabled: true,
            endpoint: Some("https://logs.example.com/ingest".into()),
            api_key: Some("secret-key".into()),
            batch_size: 10,
            flush_interval_ms: 0,
            retry_backoff_ms: 10,
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 2,
                ..CircuitBreakerConfig::default()
            },
            ..RemoteLoggerConfig::default()
        }
    }

    fn logger(client: Arc<FakeClient>, config: RemoteLoggerConfig) -> Arc<RemoteLogger> {
        Arc::new(RemoteLogger::new(config, client, Arc::new(ManualClock::default())))
    }

    #[tokio::test]
    async fn test_flush_sends_batch_and_clears_buffer() {
        let client = Arc::new(FakeClient::default());
        let logger = logger(client.clone(), config());
        logger.send_log_entry(entry("a"));
        logger.send_log_entry(entry("b"));
        assert_eq!(logger.buffered(), 2);

        let result = logger.flush().await;
        assert!(matches!(result, FlushResult::Sent { entries: 2, attempts: 1, .. }));
        assert_eq!(logger.buffered(), 0);

        let body = client.bodies.lock().unwrap()[0].clone();
        assert_eq!(body["entries"].as_array().unwrap().len(), 2);
        assert_eq!(body["entries"][0]["message"], "a");
        assert_eq!(body["entries"][0]["context"]["apiKey"], "[REDACTED]");
        assert_eq!(body["metadata"]["source"], "client");
        let headers = client.headers.lock().unwrap()[0].clone();
        assert!(headers.contains(&("Authorization".into(), "Bearer secret-key".into())));
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let client = Arc::new(FakeClient::default());
        let logger = logger(client.clone(), config());
        assert_eq!(logger.flush().await, FlushResult::Empty);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let client = Arc::new(FakeClient { fail_first: 1, ..FakeClient::default() });
        let logger = logger(client.clone(), config());
        logger.send_log_entry(entry("a"));
        let result = logger.flush().await;
        assert!(matches!(result, FlushResult::Sent { attempts: 2, .. }));
        assert_eq!(logger.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_is_dropped_and_circuit_opens() {
        let client = Arc::new(FakeClient { fail_first: usize::MAX, ..FakeClient::default() });
        let logger = logger(client.clone(), config());
        logger.send_log_entry(entry("a"));

        let result = logger.flush().await;
        assert!(!result.is_success());
        // Two real attempts open the circuit; the third is rejected without I/O.
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(logger.circuit_state(), CircuitState::Open);
        assert_eq!(logger.buffered(), 0);

        let stats = logger.stats();
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.entries_dropped, 1);
    }

    #[tokio::test]
    async fn test_batch_size_triggers_flush() {
        let client = Arc::new(FakeClient::default());
        let logger = logger(client.clone(), RemoteLoggerConfig { batch_size: 3, ..config() });
        logger.send_log_entries((0..3).map(|i| entry(&i.to_string())));

        for _ in 0..50 {
            if client.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(logger.stats().entries_sent, 3);
    }

    #[tokio::test]
    async fn test_disabled_logger_buffers_nothing() {
        let client = Arc::new(FakeClient::default());
        let logger = logger(client, RemoteLoggerConfig { enabled: false, ..config() });
        logger.send_log_entry(entry("a"));
        assert_eq!(logger.buffered(), 0);
    }

    #[tokio::test]
    async fn test_missing_endpoint_fails_without_io() {
        let client = Arc::new(FakeClient::default());
        let logger = logger(client.clone(), RemoteLoggerConfig { endpoint: None, ..config() });
        logger.send_log_entry(entry("a"));
        let result = logger.flush().await;
        assert!(matches!(result, FlushResult::Failed { attempts: 0, .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_log_sink_reports_failure() {
        let client = Arc::new(FakeClient { fail_first: usize::MAX, ..FakeClient::default() });
        let logger = logger(client, RemoteLoggerConfig { max_retries: 0, batch_size: 1, ..config() });
        let result = logger.write_batch(vec![entry("a")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_log_sink_buffers_below_batch_size() {
        let client = Arc::new(FakeClient::default());
        let logger = logger(Arc::clone(&client), config());

        logger.write_batch(vec![entry("a"), entry("b")]).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(logger.buffered(), 2);

        // The queued entries are still owed to the next explicit flush.
        assert!(matches!(logger.flush().await, FlushResult::Sent { entries: 2, .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }
}
