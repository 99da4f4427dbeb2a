//! Process-wide wiring of every subsystem.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::alerting::{AlertDeliveryReport, AlertDispatcher, EmailTransport, PerformanceAlerter};
use crate::clock::{self, SharedClock};
use crate::config::{check_config, ConfigError, ConfigOverrides, MonitoringConfig};
use crate::correlation::CorrelationContext;
use crate::fanout::Subscription;
use crate::host::{SharedHost, StaticHost};
use crate::logging::{LogEntry, PageView, SinkError, StructuredLogger};
use crate::monitoring::status::{
    FlushReport, LoggerStatus, MonitoringStatus, PerformanceStatus, SubsystemState,
};
use crate::performance::{MetricsReporter, PerformanceMonitor, TracingReporter};
use crate::remote::{HttpClient, RemoteLogger};
use crate::tracking::{CaptureRequest, ErrorSink, ErrorTrackingService, HttpErrorSink};
use crate::vitals::{EnhancedMetric, MetricEnhancer, PushSource, RawMetric, VitalsSource};

/// Analytics collaborator notified of page views.
#[async_trait]
pub trait PageViewTracker: Send + Sync {
    async fn track(&self, page: &PageView) -> Result<(), SinkError>;
}

/// External collaborators the orchestrator wires into its subsystems.
#[derive(Clone)]
pub struct Collaborators {
    pub clock: SharedClock,
    pub host: SharedHost,
    pub http: Arc<dyn HttpClient>,
    /// Defaults to an [`HttpErrorSink`] over `http`.
    pub error_sink: Option<Arc<dyn ErrorSink>>,
    pub vitals_source: Arc<dyn VitalsSource>,
    pub reporter: Arc<dyn MetricsReporter>,
    pub email: Option<Arc<dyn EmailTransport>>,
    pub page_views: Option<Arc<dyn PageViewTracker>>,
}

impl Collaborators {
    /// System clock, a server host and a push source; everything else
    /// defaults off.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            clock: clock::system(),
            host: Arc::new(StaticHost::server()),
            http,
            error_sink: None,
            vitals_source: Arc::new(PushSource::new()),
            reporter: Arc::new(TracingReporter),
            email: None,
            page_views: None,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_host(mut self, host: SharedHost) -> Self {
        self.host = host;
        self
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub fn with_vitals_source(mut self, source: Arc<dyn VitalsSource>) -> Self {
        self.vitals_source = source;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn MetricsReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_email(mut self, transport: Arc<dyn EmailTransport>) -> Self {
        self.email = Some(transport);
        self
    }

    pub fn with_page_views(mut self, tracker: Arc<dyn PageViewTracker>) -> Self {
        self.page_views = Some(tracker);
        self
    }
}

/// Everything started by one `initialize`.
struct Running {
    config: MonitoringConfig,
    logger: Arc<StructuredLogger>,
    enhancer: Arc<MetricEnhancer>,
    monitor: Arc<PerformanceMonitor>,
    tracking: Option<Arc<ErrorTrackingService>>,
    tracking_state: SubsystemState,
    alerter: Option<Arc<PerformanceAlerter>>,
    alerting_state: SubsystemState,
    remote: Option<Arc<RemoteLogger>>,
    remote_state: SubsystemState,
    _alert_feed: Option<Subscription>,
}

/// Owns the pipeline's lifecycle: initialize, route, flush, shut down.
///
/// Every routing method is a safe no-op before `initialize` or for a
/// subsystem that did not start.
pub struct MonitoringOrchestrator {
    collaborators: Collaborators,
    correlation: CorrelationContext,
    running: Mutex<Option<Arc<Running>>>,
    config_listener: Mutex<Option<JoinHandle<()>>>,
}

impl MonitoringOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            correlation: CorrelationContext::new(),
            running: Mutex::new(None),
            config_listener: Mutex::new(None),
        }
    }

    pub fn correlation(&self) -> &CorrelationContext {
        &self.correlation
    }

    fn running(&self) -> Option<Arc<Running>> {
        self.running.lock().expect("orchestrator state mutex poisoned").clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.running().is_some()
    }

    /// Environment-derived configuration plus `overrides`.
    pub async fn initialize(&self, overrides: ConfigOverrides) -> Result<MonitoringStatus, ConfigError> {
        let mut config = MonitoringConfig::from_env();
        config.apply(overrides);
        self.initialize_with(config).await
    }

    /// Validate `config` and start every subsystem. Only a production
    /// validation failure is an error; a subsystem that fails to start is
    /// reported in the returned status and the rest carry on.
    pub async fn initialize_with(&self, config: MonitoringConfig) -> Result<MonitoringStatus, ConfigError> {
        if self.is_initialized() {
            tracing::warn!("Monitoring already initialized");
            return Ok(self.status());
        }
        check_config(&config).map_err(ConfigError::Validation)?;

        let c = &self.collaborators;
        let logger = StructuredLogger::start(
            config.logger.clone(),
            c.clock.clone(),
            c.host.clone(),
            self.correlation.clone(),
        );
        let enhancer = Arc::new(MetricEnhancer::new(c.clock.clone(), c.host.clone(), self.correlation.clone()));
        let monitor = Arc::new(PerformanceMonitor::new(
            config.performance.clone(),
            Arc::clone(&enhancer),
            Arc::clone(&c.vitals_source),
            Arc::clone(&c.reporter),
        ));

        let (tracking, alerting, remote) = tokio::join!(
            self.start_tracking(&config),
            async { self.start_alerting(&config) },
            async { self.start_remote(&config) },
        );
        let (tracking, tracking_state) = tracking;
        let (alerter, alerting_state) = alerting;
        let (remote, remote_state) = remote;

        if let Some(remote) = &remote {
            logger.set_remote(remote.clone());
        }
        let alert_feed = alerter.as_ref().map(|alerter| {
            let alerter = Arc::clone(alerter);
            monitor.on_metric(move |metric| {
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    return;
                };
                let alerter = Arc::clone(&alerter);
                let metric = metric.clone();
                handle.spawn(async move {
                    alerter.process_metric(&metric).await;
                });
            })
        });
        monitor.start();

        tracing::info!(
            environment = %config.environment,
            error_tracking = ?tracking_state,
            alerting = ?alerting_state,
            remote_logging = ?remote_state,
            "Monitoring initialized"
        );

        let running = Arc::new(Running {
            config,
            logger,
            enhancer,
            monitor,
            tracking,
            tracking_state,
            alerter,
            alerting_state,
            remote,
            remote_state,
            _alert_feed: alert_feed,
        });
        *self.running.lock().expect("orchestrator state mutex poisoned") = Some(running);
        Ok(self.status())
    }

    async fn start_tracking(&self, config: &MonitoringConfig) -> (Option<Arc<ErrorTrackingService>>, SubsystemState) {
        if !config.error_tracking.enabled {
            return (None, SubsystemState::Disabled);
        }
        let c = &self.collaborators;
        let sink: Arc<dyn ErrorSink> = match &c.error_sink {
            Some(sink) => Arc::clone(sink),
            None => Arc::new(HttpErrorSink::new(Arc::clone(&c.http))),
        };
        let service = ErrorTrackingService::new(sink, c.clock.clone(), c.host.clone(), self.correlation.clone());
        match service.initialize(config.error_tracking.clone()).await {
            Ok(()) => (Some(Arc::new(service)), SubsystemState::Running),
            Err(e) => {
                tracing::error!(error = %e, "Error tracking failed to start");
                (None, SubsystemState::Failed(e.to_string()))
            }
        }
    }

    fn start_alerting(&self, config: &MonitoringConfig) -> (Option<Arc<PerformanceAlerter>>, SubsystemState) {
        if !config.alerting.enabled {
            return (None, SubsystemState::Disabled);
        }
        let c = &self.collaborators;
        let mut dispatcher = AlertDispatcher::new(Arc::clone(&c.http));
        if let Some(email) = &c.email {
            dispatcher = dispatcher.with_email(Arc::clone(email));
        }
        let alerter = PerformanceAlerter::start(config.alerting.clone(), dispatcher, c.clock.clone());
        (Some(alerter), SubsystemState::Running)
    }

    fn start_remote(&self, config: &MonitoringConfig) -> (Option<Arc<RemoteLogger>>, SubsystemState) {
        let remote = &config.remote_logging;
        if !remote.enabled {
            return (None, SubsystemState::Disabled);
        }
        if remote.endpoint.is_none() {
            tracing::error!("Remote logging enabled without an endpoint");
            return (None, SubsystemState::Failed("no endpoint configured".to_string()));
        }
        let logger = RemoteLogger::start(remote.clone(), Arc::clone(&self.collaborators.http), self.collaborators.clock.clone());
        (Some(logger), SubsystemState::Running)
    }

    /// Log the error and report it to error tracking.
    pub async fn capture_error(&self, request: CaptureRequest) -> Option<Uuid> {
        let running = self.running()?;
        let message = request
            .message
            .clone()
            .or_else(|| request.error.as_ref().map(|e| e.message.clone()))
            .unwrap_or_else(|| "Unknown error".to_string());
        running
            .logger
            .error(&message, request.error.clone(), request.context.clone());

        match &running.tracking {
            Some(tracking) => tracking.capture_error(request).await,
            None => None,
        }
    }

    /// Enhance a raw sample without recording it.
    pub fn enhance(&self, raw: RawMetric) -> Option<EnhancedMetric> {
        Some(self.running()?.enhancer.enhance(raw))
    }

    /// Enhance a raw sample and feed it to the performance monitor.
    /// Alerting sees it through the monitor's fan-out.
    pub fn report_metric(&self, raw: RawMetric) -> Option<EnhancedMetric> {
        let running = self.running()?;
        let metric = running.enhancer.enhance(raw);
        running.monitor.record(metric.clone());
        Some(metric)
    }

    /// Evaluate one metric against alert policy and deliver any alert.
    pub async fn process_performance_metric(&self, metric: &EnhancedMetric) -> Option<AlertDeliveryReport> {
        let alerter = self.running()?.alerter.clone()?;
        alerter.process_metric(metric).await
    }

    /// Queue an entry for the remote logger.
    pub fn send_log_entry(&self, entry: LogEntry) {
        match self.running().and_then(|r| r.remote.clone()) {
            Some(remote) => remote.send_log_entry(entry),
            None => tracing::trace!("Remote logging not running, entry dropped"),
        }
    }

    pub fn logger(&self) -> Option<Arc<StructuredLogger>> {
        self.running().map(|r| Arc::clone(&r.logger))
    }

    pub fn monitor(&self) -> Option<Arc<PerformanceMonitor>> {
        self.running().map(|r| Arc::clone(&r.monitor))
    }

    pub fn error_tracking(&self) -> Option<Arc<ErrorTrackingService>> {
        self.running().and_then(|r| r.tracking.clone())
    }

    pub fn alerter(&self) -> Option<Arc<PerformanceAlerter>> {
        self.running().and_then(|r| r.alerter.clone())
    }

    pub fn remote_logger(&self) -> Option<Arc<RemoteLogger>> {
        self.running().and_then(|r| r.remote.clone())
    }

    /// Log the page view and hand it to the analytics tracker.
    pub async fn track_page_view(&self, page: PageView) {
        let Some(running) = self.running() else {
            return;
        };
        running.logger.log_page_view("Page view", page.clone());
        if let Some(tracker) = &self.collaborators.page_views {
            if let Err(e) = tracker.track(&page).await {
                tracing::warn!(error = %e, page = %page.page, "Page view tracking failed");
            }
        }
    }

    /// Flush every running subsystem. Never fails; each subsystem's
    /// outcome is in the report.
    pub async fn flush(&self) -> Option<FlushReport> {
        let running = self.running()?;
        let logger_entries = running.logger.buffered();
        running.logger.flush().await;

        let performance = if running.monitor.is_started() {
            Some(running.monitor.flush().await.map_err(|e| {
                tracing::warn!(error = %e, "Performance flush failed");
                e.to_string()
            }))
        } else {
            None
        };
        let error_tracking = match &running.tracking {
            Some(tracking) => Some(tracking.flush().await),
            None => None,
        };
        let remote_logging = match &running.remote {
            Some(remote) => Some(remote.flush().await),
            None => None,
        };

        Some(FlushReport {
            logger_entries: Some(logger_entries),
            performance,
            error_tracking,
            remote_logging,
        })
    }

    pub fn status(&self) -> MonitoringStatus {
        let Some(running) = self.running() else {
            return MonitoringStatus::uninitialized();
        };
        MonitoringStatus {
            initialized: true,
            environment: Some(running.config.environment),
            logger: Some(LoggerStatus {
                buffered: running.logger.buffered(),
            }),
            performance: Some(PerformanceStatus {
                started: running.monitor.is_started(),
                buffered: running.monitor.get_metrics().len(),
                budget_violations: running.monitor.budget_violations().len(),
            }),
            error_tracking: running.tracking_state.clone(),
            error_tracking_stats: running.tracking.as_ref().map(|t| t.stats()),
            alerting: running.alerting_state.clone(),
            alerting_stats: running.alerter.as_ref().map(|a| a.stats()),
            remote_logging: running.remote_state.clone(),
            remote_logging_stats: running.remote.as_ref().map(|r| r.stats()),
        }
    }

    /// Apply a reloaded configuration. Alert thresholds and channels take
    /// effect immediately; other sections need a restart.
    pub fn apply_config(&self, config: &MonitoringConfig) {
        let Some(running) = self.running() else {
            return;
        };
        match &running.alerter {
            Some(alerter) => alerter.update_config(config.alerting.clone()),
            None if config.alerting.enabled => {
                tracing::warn!("Alerting enabled by reload; restart to start it");
            }
            None => {}
        }
        if running.config.remote_logging != config.remote_logging || running.config.error_tracking != config.error_tracking {
            tracing::info!("Remote logging or error tracking changed; restart to apply");
        }
    }

    /// Apply every configuration the receiver yields until it closes.
    pub fn listen_for_config(self: &Arc<Self>, mut updates: mpsc::UnboundedReceiver<MonitoringConfig>) {
        let orchestrator = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                let Some(orchestrator) = orchestrator.upgrade() else {
                    break;
                };
                orchestrator.apply_config(&config);
            }
        });
        if let Some(previous) = self
            .config_listener
            .lock()
            .expect("orchestrator listener mutex poisoned")
            .replace(handle)
        {
            previous.abort();
        }
    }

    /// Flush everything, then stop every timer. The orchestrator can be
    /// initialized again afterwards.
    pub async fn shutdown(&self) -> Option<FlushReport> {
        let report = self.flush().await;
        let running = self.running.lock().expect("orchestrator state mutex poisoned").take()?;
        if let Some(listener) = self.config_listener.lock().expect("orchestrator listener mutex poisoned").take() {
            listener.abort();
        }

        running.monitor.stop();
        running.logger.destroy();
        if let Some(alerter) = &running.alerter {
            alerter.destroy();
        }
        if let Some(remote) = &running.remote {
            remote.destroy();
        }
        tracing::info!("Monitoring shut down");
        report
    }
}

impl std::fmt::Debug for MonitoringOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringOrchestrator")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
