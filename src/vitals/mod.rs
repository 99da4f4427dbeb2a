//! Core Web Vitals integration.
//!
//! # Data Flow
//! ```text
//! VitalsSource (host measurement callbacks, one per metric)
//!     → enhancer.rs (rating, timestamp, url, user agent, correlation id,
//!                    device/connection hints)
//!     → caller's callback                      (setup)
//!     → collector.rs (sample draw, bounded buffer, subscriber fan-out)
//! ```
//!
//! # Design Decisions
//! - Rating thresholds are a config value object with the standard defaults
//! - Enhancement never fails; missing host values are omitted
//! - A panicking subscriber is isolated from the others

pub mod collector;
pub mod enhancer;
pub mod rating;
pub mod source;
pub mod types;

pub use collector::{CollectorConfig, WebVitalsCollector};
pub use enhancer::{MetricCallback, MetricEnhancer};
pub use rating::{calculate_rating, default_thresholds, RatingThresholds, Thresholds};
pub use source::{PushSource, RawMetricHandler, VitalsSource};
pub use types::{EnhancedMetric, MetricName, Rating, RawMetric, VitalsConfig};
