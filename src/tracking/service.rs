//! Error tracking service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use uuid::Uuid;

use crate::clock::{self, SharedClock};
use crate::config::Environment;
use crate::correlation::CorrelationContext;
use crate::host::SharedHost;
use crate::logging::{sanitize_context, ContextValue, ErrorInfo};
use crate::observability::metrics;
use crate::tracking::fingerprint::{fingerprint, fingerprint_key};
use crate::tracking::rate_limit::FingerprintRateLimiter;
use crate::tracking::sink::ErrorSink;
use crate::tracking::types::{
    Breadcrumb, CaptureRequest, ErrorEvent, ErrorLevel, ErrorTrackingConfig, TrackingError,
    TrackingResult, UserContext,
};

/// Limiter keys kept before idle ones are purged.
const PURGE_THRESHOLD: usize = 1024;

/// Check DSN shape, sample rate and environment.
pub fn validate_tracking_config(config: &ErrorTrackingConfig) -> TrackingResult<()> {
    if let Some(dsn) = &config.dsn {
        if !dsn.starts_with("https://") || !dsn.contains('@') {
            return Err(TrackingError::InvalidDsn(dsn.clone()));
        }
    }
    if !(0.0..=1.0).contains(&config.sample_rate) {
        return Err(TrackingError::InvalidSampleRate(config.sample_rate));
    }
    config
        .environment
        .parse::<Environment>()
        .map_err(|_| TrackingError::InvalidEnvironment(config.environment.clone()))?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStats {
    pub captured: u64,
    pub rate_limited: u64,
    pub sampled_out: u64,
    pub ignored: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    captured: AtomicU64,
    rate_limited: AtomicU64,
    sampled_out: AtomicU64,
    ignored: AtomicU64,
    failed: AtomicU64,
}

struct Active {
    config: ErrorTrackingConfig,
    limiter: Arc<FingerprintRateLimiter>,
}

/// Turns errors into fingerprinted, rate-limited events for an
/// [`ErrorSink`]. No public method fails because of the sink.
pub struct ErrorTrackingService {
    sink: Arc<dyn ErrorSink>,
    clock: SharedClock,
    host: SharedHost,
    correlation: CorrelationContext,
    active: Mutex<Option<Active>>,
    initialized: AtomicBool,
    user: Mutex<Option<UserContext>>,
    sampler: Arc<dyn Fn() -> f64 + Send + Sync>,
    counters: Counters,
}

impl ErrorTrackingService {
    pub fn new(
        sink: Arc<dyn ErrorSink>,
        clock: SharedClock,
        host: SharedHost,
        correlation: CorrelationContext,
    ) -> Self {
        Self {
            sink,
            clock,
            host,
            correlation,
            active: Mutex::new(None),
            initialized: AtomicBool::new(false),
            user: Mutex::new(None),
            sampler: Arc::new(fastrand::f64),
            counters: Counters::default(),
        }
    }

    /// Replace the sample draw (tests).
    pub fn with_sampler(mut self, sampler: Arc<dyn Fn() -> f64 + Send + Sync>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Validate `config` and initialize the sink. A disabled config is a
    /// no-op; an invalid one is returned as an error.
    pub async fn initialize(&self, config: ErrorTrackingConfig) -> TrackingResult<()> {
        if !config.enabled {
            tracing::info!("Error tracking disabled");
            return Ok(());
        }
        validate_tracking_config(&config)?;
        self.sink.init(&config).await?;

        let limiter = Arc::new(FingerprintRateLimiter::new(config.rate_limit.clone(), self.clock.clone()));
        tracing::info!(
            environment = %config.environment,
            sample_rate = config.sample_rate,
            dsn_configured = config.dsn.is_some(),
            "Error tracking initialized"
        );
        *self.active.lock().expect("tracking state mutex poisoned") = Some(Active { config, limiter });
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn active(&self) -> Option<(ErrorTrackingConfig, Arc<FingerprintRateLimiter>)> {
        self.active
            .lock()
            .expect("tracking state mutex poisoned")
            .as_ref()
            .map(|a| (a.config.clone(), Arc::clone(&a.limiter)))
    }

    /// Report an error. Returns the event id when it reached the sink.
    pub async fn capture_error(&self, request: CaptureRequest) -> Option<Uuid> {
        let (config, limiter) = self.active()?;

        let error = request.error.unwrap_or_else(ErrorInfo::undefined);
        let message = request.message.unwrap_or_else(|| error.message.clone());

        if config.ignore_errors.iter().any(|pattern| message.contains(pattern.as_str())) {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            metrics::record_error_event("ignored");
            return None;
        }

        if (self.sampler)() >= config.sample_rate {
            self.counters.sampled_out.fetch_add(1, Ordering::Relaxed);
            metrics::record_error_event("sampled_out");
            return None;
        }

        let parts = fingerprint(&message, &error);
        if !limiter.check(&fingerprint_key(&parts)) {
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            metrics::record_error_event("rate_limited");
            tracing::debug!(fingerprint = %fingerprint_key(&parts), "Error event rate limited");
            return None;
        }
        if limiter.tracked_keys() > PURGE_THRESHOLD {
            limiter.purge();
        }

        let event = ErrorEvent {
            id: Uuid::new_v4(),
            timestamp: clock::iso(self.clock.now()),
            correlation_id: self.correlation.current_or_generate(),
            message,
            level: request.level,
            error,
            context: request.context.as_ref().map(sanitize_context),
            url: self.host.url(),
            user_agent: self.host.user_agent(),
            user: self.user.lock().expect("tracking user mutex poisoned").clone(),
            tags: request.tags,
            fingerprint: parts,
        };

        match self.sink.capture_exception(&event).await {
            Ok(()) => {
                self.counters.captured.fetch_add(1, Ordering::Relaxed);
                metrics::record_error_event("captured");
                Some(event.id)
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::record_error_event("failed");
                metrics::record_delivery_failure("error_tracking");
                tracing::warn!(error = %e, event_id = %event.id, "Failed to report error event");
                None
            }
        }
    }

    /// Shorthand for a Rust error value.
    pub async fn capture_exception<E>(&self, err: &E, context: Option<ContextValue>) -> Option<Uuid>
    where
        E: std::error::Error + ?Sized,
    {
        let mut request = CaptureRequest::error(ErrorInfo::from_error(err));
        request.context = context;
        self.capture_error(request).await
    }

    pub async fn capture_message(&self, message: &str, level: ErrorLevel) -> bool {
        if !self.is_initialized() {
            return false;
        }
        match self.sink.capture_message(message, level).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to report message");
                false
            }
        }
    }

    pub fn set_user(&self, user: Option<UserContext>) {
        *self.user.lock().expect("tracking user mutex poisoned") = user.clone();
        if !self.is_initialized() {
            return;
        }
        if let Err(e) = self.sink.set_user(user) {
            tracing::warn!(error = %e, "Failed to set error tracking user");
        }
    }

    pub fn set_tags(&self, tags: BTreeMap<String, String>) {
        if !self.is_initialized() {
            return;
        }
        if let Err(e) = self.sink.set_tags(tags) {
            tracing::warn!(error = %e, "Failed to set error tracking tags");
        }
    }

    /// Record a breadcrumb, stamping it with the current time.
    pub fn add_breadcrumb(&self, category: Option<&str>, message: &str, level: ErrorLevel, data: Option<ContextValue>) {
        if !self.is_initialized() {
            return;
        }
        let breadcrumb = Breadcrumb {
            timestamp: clock::iso(self.clock.now()),
            category: category.map(str::to_string),
            message: message.to_string(),
            level,
            data: data.as_ref().map(sanitize_context),
        };
        if let Err(e) = self.sink.add_breadcrumb(breadcrumb) {
            tracing::warn!(error = %e, "Failed to add breadcrumb");
        }
    }

    pub async fn flush(&self) -> bool {
        if !self.is_initialized() {
            return true;
        }
        match self.sink.flush().await {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(error = %e, "Error tracking flush failed");
                false
            }
        }
    }

    pub fn stats(&self) -> TrackingStats {
        TrackingStats {
            captured: self.counters.captured.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            sampled_out: self.counters.sampled_out.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ErrorTrackingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorTrackingService")
            .field("initialized", &self.is_initialized())
            .field("stats", &self.stats())
            .finish()
    }
}
