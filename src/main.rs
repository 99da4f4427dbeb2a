//! Telemetry pipeline daemon.
//!
//! Reads newline-delimited JSON events on stdin and routes them through
//! the monitoring pipeline until end of input or Ctrl+C.
//!
//! # Architecture Overview
//!
//! ```text
//!   stdin (NDJSON)                ┌────────────────────────────────────────────┐
//!   ──────────────► ingest ──────►│          MonitoringOrchestrator            │
//!                                 │                                            │
//!                                 │  logger ──────────────► remote logger ─────┼──► log endpoint
//!                                 │  performance monitor ─► alerter ───────────┼──► Slack / email / webhook
//!                                 │  error tracking ───────────────────────────┼──► error store
//!                                 └────────────────────────────────────────────┘
//!   config.toml ──► watcher ──► apply_config (alert thresholds and channels)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use telemetry_pipeline::config::{read_config, ConfigOverrides, ConfigWatcher, Environment};
use telemetry_pipeline::lifecycle::signals::shutdown_signal;
use telemetry_pipeline::monitoring::{dispatch, parse_line};
use telemetry_pipeline::observability::{init_metrics, init_tracing};
use telemetry_pipeline::remote::ReqwestClient;
use telemetry_pipeline::{Collaborators, MonitoringOrchestrator};

#[derive(Parser)]
#[command(name = "telemetry-pipeline")]
#[command(about = "Route NDJSON telemetry events through logging, vitals, error tracking and alerting", long_about = None)]
struct Cli {
    /// TOML configuration file. Without one, configuration comes from the environment.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload alerting configuration when the file changes.
    #[arg(short, long, requires = "config")]
    watch: bool,

    /// Force the production environment (validation errors become fatal).
    #[arg(long)]
    production: bool,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Timeout for outbound HTTP requests, in seconds.
    #[arg(long, default_value_t = 10)]
    http_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        environment: cli.production.then_some(Environment::Production),
        ..ConfigOverrides::default()
    };
    let config = read_config(cli.config.as_deref(), overrides)?;

    init_tracing(
        config.observability.json || cli.json_logs,
        Some(config.observability.log_level.as_str()),
    );
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "telemetry-pipeline starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let http = Arc::new(ReqwestClient::new(Duration::from_secs(cli.http_timeout_secs))?);
    let orchestrator = Arc::new(MonitoringOrchestrator::new(Collaborators::new(http)));
    let status = orchestrator.initialize_with(config).await?;
    tracing::info!(
        error_tracking = ?status.error_tracking,
        alerting = ?status.alerting,
        remote_logging = ?status.remote_logging,
        "Monitoring initialized"
    );

    // Dropping the notify watcher stops the events, so it lives until exit.
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            orchestrator.listen_for_config(updates);
            Some(watcher.run()?)
        }
        _ => None,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::info!(lines = line_no, "End of input");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                line_no += 1;
                match parse_line(line_no, &line) {
                    Ok(Some(event)) => dispatch(&orchestrator, event).await,
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "Skipping malformed event"),
                }
            }
        }
    }

    let report = orchestrator.shutdown().await;
    tracing::info!(report = ?report, "Shutdown complete");
    Ok(())
}
