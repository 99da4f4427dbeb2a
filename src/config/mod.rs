//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! environment variables ──► MonitoringConfig::from_env
//! config file (TOML) ─────► loader.rs (parse & deserialize)
//!     → overrides (whole sections)
//!     → validation.rs (semantic checks)
//!     → MonitoringConfig handed to the orchestrator
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → update sent on a channel
//!     → orchestrator swaps alert thresholds atomically
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only production treats validation errors as fatal

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, read_config, resolve_config, ConfigError};
pub use schema::{ConfigOverrides, Environment, MonitoringConfig, ObservabilityConfig, UnknownEnvironment};
pub use validation::{check_config, validate_config, IssueSeverity, ValidationError};
pub use watcher::ConfigWatcher;
