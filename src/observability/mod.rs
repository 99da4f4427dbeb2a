//! Internal observability of the pipeline itself.
//!
//! # Data Flow
//! ```text
//! Every subsystem produces:
//!     → tracing events (diagnostics, console sink of the structured logger)
//!     → metrics.rs (dropped entries, delivery failures, circuit state,
//!       alerts, vitals histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → Prometheus exporter (optional scrape endpoint)
//! ```
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so library users pay nothing
//! - Label values are static strings or metric names, never user input

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::init_metrics;
