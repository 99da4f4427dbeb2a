//! Correlation context subsystem.
//!
//! # Data Flow
//! ```text
//! Entry point (request handler, UI event, CLI line)
//!     → id.rs (generate / validate a UUID-v4 correlation id)
//!     → context.rs (set as current, or scope it around a call chain)
//!     → logger / enhancer / error tracker read the current id
//! ```
//!
//! # Design Decisions
//! - The context is an explicit carrier value (`CorrelationContext`) handed to
//!   every component at construction, not a process-wide static
//! - Async call chains can be scoped per task so concurrent operations never
//!   observe each other's id
//! - Scope exit always restores the previous id, also when the body fails or panics

pub mod context;
pub mod id;

pub use context::{CorrelationContext, CorrelationManager};
pub use id::{CorrelationError, CorrelationId, X_CORRELATION_ID};
