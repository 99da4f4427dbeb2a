//! Error tracking.
//!
//! # Data Flow
//! ```text
//! capture_error(CaptureRequest)
//!     → ignore list, sample gate
//!     → fingerprint.rs (normalized message + first located frame)
//!     → rate_limit.rs (5 per 60s per fingerprint)
//!     → ErrorEvent (sanitized context, url, user agent, user, tags)
//!     → sink.rs (Sentry-style SDK surface; HTTP store endpoint in production)
//! ```
//!
//! # Design Decisions
//! - Reporting an error never fails the caller; sink errors are logged
//! - Initialization validates config and is the only fallible entry point
//! - Fingerprints group errors that differ only in ids and counts

pub mod fingerprint;
pub mod rate_limit;
pub mod service;
pub mod sink;
pub mod types;

pub use fingerprint::{fingerprint, fingerprint_key, normalize_message};
pub use rate_limit::FingerprintRateLimiter;
pub use service::{validate_tracking_config, ErrorTrackingService, TrackingStats};
pub use sink::{ErrorSink, HttpErrorSink, RecordingErrorSink, StoreEndpoint};
pub use types::{
    Breadcrumb, CaptureRequest, ErrorEvent, ErrorLevel, ErrorTrackingConfig, RateLimitConfig,
    TrackingError, TrackingResult, UserContext,
};
