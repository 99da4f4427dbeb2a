//! Monitoring orchestration.
//!
//! # Data Flow
//! ```text
//! initialize(overrides)
//!     → MonitoringConfig::from_env + overrides
//!     → check_config (fatal only in production)
//!     → logger + performance monitor
//!     → error tracking ┐
//!       alerting       ├ started concurrently, each may fail alone
//!       remote logging ┘
//!     → logger flushes into the remote logger
//!     → monitor fan-out feeds the alerter
//!
//! stdin NDJSON ──► ingest.rs parse_line / dispatch
//!
//! capture_error / report_metric / send_log_entry / track_page_view
//!     → routed to whichever subsystems are running
//! ```
//!
//! # Design Decisions
//! - Routing methods before `initialize` are silent no-ops
//! - `flush` and `shutdown` report per-subsystem outcomes instead of failing

pub mod ingest;
pub mod orchestrator;
pub mod status;

pub use ingest::{dispatch, parse_line, IngestError, InputEvent};
pub use orchestrator::{Collaborators, MonitoringOrchestrator, PageViewTracker};
pub use status::{FlushReport, LoggerStatus, MonitoringStatus, PerformanceStatus, SubsystemState};
