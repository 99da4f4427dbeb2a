//! Performance monitoring.
//!
//! # Data Flow
//! ```text
//! VitalsSource
//!     → MetricEnhancer::setup (started monitors only)
//!     → monitor.rs (sample gate, bounded buffer, on_metric fan-out)
//!     → flush(): budget.rs violations + MetricsReporter
//! ```
//!
//! # Design Decisions
//! - start/stop are idempotent; a restart ignores handlers from the
//!   previous run
//! - Invalid config is clamped and logged, never rejected
//! - flush() returns delivery errors to the caller and keeps the buffer,
//!   which is the opposite of the logger's fire-and-forget flush

pub mod budget;
pub mod monitor;

pub use budget::{calculate_budget_violations, check_budget, BudgetViolation, ViolationSeverity};
pub use monitor::{
    validate_config, MetricsReporter, MonitorError, MonitorResult, PerformanceConfig,
    PerformanceMonitor, TracingReporter,
};
