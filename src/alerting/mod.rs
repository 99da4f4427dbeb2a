//! Performance alerting.
//!
//! # Data Flow
//! ```text
//! EnhancedMetric
//!     → alerter.rs should_trigger (enabled, severity, cooldown, hourly cap)
//!     → create_alert (warning / error / critical at 2x error)
//!     → channels.rs AlertDispatcher
//!         ├── Slack incoming webhook (blocks payload)
//!         ├── EmailTransport
//!         └── generic JSON webhook
//!     → AlertDeliveryReport (one outcome per channel)
//! ```
//!
//! # Design Decisions
//! - Cooldown and hourly cap are recorded when the alert is created, before
//!   delivery, so concurrent metrics cannot both slip under the cap
//! - Channel failures are counted and logged, never returned as errors
//! - Configuration is swapped atomically; history survives a reload

pub mod alerter;
pub mod channels;
pub mod types;

pub use alerter::{alert_severity, create_alert, should_trigger, PerformanceAlerter};
pub use channels::{AlertDispatcher, EmailMessage, EmailTransport};
pub use types::{
    default_alert_thresholds, AlertChannels, AlertConfig, AlertDeliveryReport, AlertError,
    AlertSeverity, AlertThreshold, AlerterStats, ChannelError, ChannelKind, ChannelOutcome,
    EmailChannelConfig, PerformanceAlert, SlackChannelConfig, WebhookChannelConfig,
};
