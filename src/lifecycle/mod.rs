//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Component start():
//!     timer.rs spawns an interval task holding a Weak<component>
//!     → each tick upgrades the Weak and runs flush/sweep
//!
//! Component stop()/destroy():
//!     shutdown.rs trigger → timer task leaves its loop
//!     → one last flush is spawned, not awaited
//!
//! Signals (signals.rs):
//!     SIGINT → binary flushes and exits
//! ```
//!
//! # Design Decisions
//! - Timers never keep a component alive: they hold weak references
//! - No runtime available means no timer, and a debug log instead of a panic

pub mod shutdown;
pub mod signals;
pub mod timer;

pub use shutdown::Shutdown;
pub use timer::{spawn_interval, TimerHandle};
