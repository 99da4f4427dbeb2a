//! Remote log shipping.
//!
//! # Data Flow
//! ```text
//! send_log_entry / LogSink::write_batch
//!     → logger.rs (sanitize context, tag source + environment, bounded buffer)
//!     → batch_size reached or timer tick → flush()
//!         → snapshot + clear buffer
//!         → LogBatch { id, timestamp, entries, metadata }
//!         → retries (base × 2^attempt) → circuit breaker → timeout
//!         → transport.rs (POST JSON, Bearer auth, non-2xx = failure)
//! ```
//!
//! # Design Decisions
//! - At-most-once toward the buffer: a batch that exhausts its retries is
//!   dropped and counted, never re-queued
//! - Flush reports a [`FlushResult`] instead of failing
//! - The HTTP client is a trait object so tests need no network

pub mod logger;
pub mod transport;
pub mod types;

pub use logger::RemoteLogger;
pub use transport::{json_headers, HttpClient, HttpResponse, ReqwestClient, TransportError};
pub use types::{
    BatchMetadata, FlushResult, LogBatch, LogSource, RemoteLogEntry, RemoteLoggerConfig,
    RemoteLoggerStats,
};
