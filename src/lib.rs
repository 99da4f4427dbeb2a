//! Telemetry pipeline library.
//!
//! Correlation ids, structured logging, Web Vitals enhancement, budget
//! checks, error tracking, performance alerting and batched remote log
//! shipping, wired together by [`MonitoringOrchestrator`].

// Shared building blocks
pub mod buffer;
pub mod clock;
pub mod fanout;
pub mod host;

// Pipeline stages
pub mod correlation;
pub mod logging;
pub mod vitals;
pub mod performance;
pub mod tracking;
pub mod alerting;
pub mod remote;
pub mod monitoring;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::MonitoringConfig;
pub use correlation::{CorrelationContext, CorrelationId};
pub use lifecycle::Shutdown;
pub use monitoring::{Collaborators, MonitoringOrchestrator};
