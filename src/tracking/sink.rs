//! External error-reporting collaborators.
//!
//! [`ErrorSink`] mirrors the surface of a Sentry-style SDK. The service
//! never lets a sink failure escape; sinks just report what went wrong.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::buffer::RingBuffer;
use crate::remote::transport::HttpClient;
use crate::tracking::types::{
    Breadcrumb, ErrorEvent, ErrorLevel, ErrorTrackingConfig, TrackingError, TrackingResult,
    UserContext,
};

#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn init(&self, config: &ErrorTrackingConfig) -> TrackingResult<()>;
    async fn capture_exception(&self, event: &ErrorEvent) -> TrackingResult<()>;
    async fn capture_message(&self, message: &str, level: ErrorLevel) -> TrackingResult<()>;
    fn set_user(&self, user: Option<UserContext>) -> TrackingResult<()>;
    fn set_tags(&self, tags: BTreeMap<String, String>) -> TrackingResult<()>;
    fn add_breadcrumb(&self, breadcrumb: Breadcrumb) -> TrackingResult<()>;
    /// Deliver anything pending. Returns whether everything went out.
    async fn flush(&self) -> TrackingResult<bool>;
}

/// Where and how to POST events for a DSN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEndpoint {
    pub url: String,
    pub public_key: String,
}

impl StoreEndpoint {
    /// `https://<key>@<host>/<project>` → `https://<host>/api/<project>/store/`.
    pub fn from_dsn(dsn: &str) -> TrackingResult<Self> {
        let parsed = Url::parse(dsn).map_err(|_| TrackingError::InvalidDsn(dsn.to_string()))?;
        if parsed.scheme() != "https" || parsed.username().is_empty() {
            return Err(TrackingError::InvalidDsn(dsn.to_string()));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| TrackingError::InvalidDsn(dsn.to_string()))?;
        let project = parsed.path().trim_matches('/');
        if project.is_empty() {
            return Err(TrackingError::InvalidDsn(dsn.to_string()));
        }
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self {
            url: format!("https://{authority}/api/{project}/store/"),
            public_key: parsed.username().to_string(),
        })
    }

    fn auth_header(&self) -> String {
        format!(
            "Sentry sentry_version=7, sentry_key={}, sentry_client=telemetry-pipeline/{}",
            self.public_key,
            env!("CARGO_PKG_VERSION")
        )
    }
}

#[derive(Debug)]
struct Scope {
    endpoint: Option<StoreEndpoint>,
    environment: String,
    release: Option<String>,
    user: Option<UserContext>,
    tags: BTreeMap<String, String>,
    max_breadcrumbs: usize,
    breadcrumbs: RingBuffer<Breadcrumb>,
}

/// Posts events to a Sentry-compatible store endpoint.
pub struct HttpErrorSink {
    client: Arc<dyn HttpClient>,
    scope: Mutex<Scope>,
}

impl HttpErrorSink {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            scope: Mutex::new(Scope {
                endpoint: None,
                environment: "development".to_string(),
                release: None,
                user: None,
                tags: BTreeMap::new(),
                max_breadcrumbs: 100,
                breadcrumbs: RingBuffer::new(100),
            }),
        }
    }

    fn payload(&self, event: &ErrorEvent) -> (Option<StoreEndpoint>, Value) {
        let scope = self.scope.lock().expect("error sink scope mutex poisoned");
        let mut tags = scope.tags.clone();
        if let Some(event_tags) = &event.tags {
            tags.extend(event_tags.clone());
        }
        tags.insert("correlation_id".to_string(), event.correlation_id.to_string());

        let body = json!({
            "event_id": event.id.simple().to_string(),
            "timestamp": event.timestamp,
            "level": event.level.as_str(),
            "platform": "other",
            "message": event.message,
            "environment": scope.environment,
            "release": scope.release,
            "exception": {
                "values": [{
                    "type": event.error.name,
                    "value": event.error.message,
                    "stacktrace": event.error.stack,
                }]
            },
            "user": event.user.as_ref().or(scope.user.as_ref()),
            "tags": tags,
            "extra": event.context,
            "fingerprint": event.fingerprint,
            "breadcrumbs": { "values": scope.breadcrumbs.to_vec() },
            "request": {
                "url": event.url,
                "headers": { "User-Agent": event.user_agent },
            },
        });
        (scope.endpoint.clone(), body)
    }

    async fn send(&self, endpoint: Option<StoreEndpoint>, body: Value) -> TrackingResult<()> {
        let Some(endpoint) = endpoint else {
            return Err(TrackingError::Sink("sink not initialized".to_string()));
        };
        let headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("X-Sentry-Auth".to_string(), endpoint.auth_header()),
        ];
        self.client
            .post(&endpoint.url, &body, &headers)
            .await
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|e| TrackingError::Sink(e.to_string()))
    }
}

#[async_trait]
impl ErrorSink for HttpErrorSink {
    async fn init(&self, config: &ErrorTrackingConfig) -> TrackingResult<()> {
        let endpoint = match config.dsn.as_deref() {
            Some(dsn) => Some(StoreEndpoint::from_dsn(dsn)?),
            None => None,
        };
        let mut scope = self.scope.lock().expect("error sink scope mutex poisoned");
        scope.endpoint = endpoint;
        scope.environment = config.environment.clone();
        scope.release = config.release.clone();
        scope.max_breadcrumbs = config.max_breadcrumbs;
        scope.breadcrumbs.resize(config.max_breadcrumbs);
        if config.max_breadcrumbs == 0 {
            scope.breadcrumbs.clear();
        }
        Ok(())
    }

    async fn capture_exception(&self, event: &ErrorEvent) -> TrackingResult<()> {
        let (endpoint, body) = self.payload(event);
        self.send(endpoint, body).await
    }

    async fn capture_message(&self, message: &str, level: ErrorLevel) -> TrackingResult<()> {
        let (endpoint, body) = {
            let scope = self.scope.lock().expect("error sink scope mutex poisoned");
            let body = json!({
                "event_id": uuid::Uuid::new_v4().simple().to_string(),
                "level": level.as_str(),
                "platform": "other",
                "message": message,
                "environment": scope.environment,
                "release": scope.release,
                "user": scope.user,
                "tags": scope.tags,
                "breadcrumbs": { "values": scope.breadcrumbs.to_vec() },
            });
            (scope.endpoint.clone(), body)
        };
        self.send(endpoint, body).await
    }

    fn set_user(&self, user: Option<UserContext>) -> TrackingResult<()> {
        self.scope.lock().expect("error sink scope mutex poisoned").user = user;
        Ok(())
    }

    fn set_tags(&self, tags: BTreeMap<String, String>) -> TrackingResult<()> {
        self.scope.lock().expect("error sink scope mutex poisoned").tags.extend(tags);
        Ok(())
    }

    fn add_breadcrumb(&self, breadcrumb: Breadcrumb) -> TrackingResult<()> {
        let mut scope = self.scope.lock().expect("error sink scope mutex poisoned");
        if scope.max_breadcrumbs > 0 {
            scope.breadcrumbs.push(breadcrumb);
        }
        Ok(())
    }

    async fn flush(&self) -> TrackingResult<bool> {
        // Events are posted as they are captured.
        Ok(true)
    }
}

impl std::fmt::Debug for HttpErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scope = self.scope.lock().expect("error sink scope mutex poisoned");
        f.debug_struct("HttpErrorSink").field("endpoint", &scope.endpoint).finish()
    }
}

/// In-memory sink that keeps everything it is given.
#[derive(Debug, Default)]
pub struct RecordingErrorSink {
    pub events: Mutex<Vec<ErrorEvent>>,
    pub messages: Mutex<Vec<(String, ErrorLevel)>>,
    pub breadcrumbs: Mutex<Vec<Breadcrumb>>,
    pub user: Mutex<Option<UserContext>>,
    pub tags: Mutex<BTreeMap<String, String>>,
    pub initialized: Mutex<Option<ErrorTrackingConfig>>,
    /// When set, every call fails with this message.
    pub fail_with: Mutex<Option<String>>,
}

impl RecordingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ErrorEvent> {
        self.events.lock().expect("recording sink mutex poisoned").clone()
    }

    pub fn set_failing(&self, message: Option<&str>) {
        *self.fail_with.lock().expect("recording sink mutex poisoned") = message.map(str::to_string);
    }

    fn check(&self) -> TrackingResult<()> {
        match self.fail_with.lock().expect("recording sink mutex poisoned").as_ref() {
            Some(message) => Err(TrackingError::Sink(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ErrorSink for RecordingErrorSink {
    async fn init(&self, config: &ErrorTrackingConfig) -> TrackingResult<()> {
        self.check()?;
        *self.initialized.lock().expect("recording sink mutex poisoned") = Some(config.clone());
        Ok(())
    }

    async fn capture_exception(&self, event: &ErrorEvent) -> TrackingResult<()> {
        self.check()?;
        self.events.lock().expect("recording sink mutex poisoned").push(event.clone());
        Ok(())
    }

    async fn capture_message(&self, message: &str, level: ErrorLevel) -> TrackingResult<()> {
        self.check()?;
        self.messages
            .lock()
            .expect("recording sink mutex poisoned")
            .push((message.to_string(), level));
        Ok(())
    }

    fn set_user(&self, user: Option<UserContext>) -> TrackingResult<()> {
        self.check()?;
        *self.user.lock().expect("recording sink mutex poisoned") = user;
        Ok(())
    }

    fn set_tags(&self, tags: BTreeMap<String, String>) -> TrackingResult<()> {
        self.check()?;
        self.tags.lock().expect("recording sink mutex poisoned").extend(tags);
        Ok(())
    }

    fn add_breadcrumb(&self, breadcrumb: Breadcrumb) -> TrackingResult<()> {
        self.check()?;
        self.breadcrumbs.lock().expect("recording sink mutex poisoned").push(breadcrumb);
        Ok(())
    }

    async fn flush(&self) -> TrackingResult<bool> {
        self.check()?;
        Ok(true)
    }
}
