//! Subscriber installation for the crate's own diagnostics.
//!
//! Pretty output during development, one JSON object per line in
//! production. `RUST_LOG` wins over the configured level.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor a configured level is set.
pub const DEFAULT_FILTER: &str = "telemetry_pipeline=info";

/// Build the filter directive for a configured level such as `"debug"`.
pub fn filter_directive(level: Option<&str>) -> String {
    match level.map(str::trim).filter(|l| !l.is_empty()) {
        Some(level) => format!("telemetry_pipeline={level}"),
        None => DEFAULT_FILTER.to_string(),
    }
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_tracing(json: bool, level: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).try_init()
    };

    result.is_ok()
}
