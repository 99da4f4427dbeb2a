use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use telemetry_pipeline::alerting::{create_alert, AlertDispatcher};
use telemetry_pipeline::clock;
use telemetry_pipeline::config::{read_config, validate_config, ConfigOverrides, Environment, MonitoringConfig};
use telemetry_pipeline::host::StaticHost;
use telemetry_pipeline::remote::ReqwestClient;
use telemetry_pipeline::vitals::{calculate_rating, default_thresholds, MetricEnhancer, MetricName, RawMetric};
use telemetry_pipeline::CorrelationContext;

#[derive(Parser)]
#[command(name = "telemetry-ctl")]
#[command(about = "Inspect and exercise telemetry-pipeline configuration", long_about = None)]
struct Cli {
    /// TOML configuration file. Without one, configuration comes from the environment.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Evaluate as production.
    #[arg(long, global = true)]
    production: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as JSON
    Show,
    /// List validation issues; exits non-zero on errors
    Validate,
    /// Rate a metric value against the Web Vitals thresholds
    Rate { metric: String, value: f64 },
    /// Send a test alert through the configured channels
    TestAlert { metric: String, value: f64 },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        environment: cli.production.then_some(Environment::Production),
        ..ConfigOverrides::default()
    };

    match cli.command {
        Commands::Show => {
            let config = read_config(cli.config.as_deref(), overrides)?;
            print_json(&config)?;
        }
        Commands::Validate => {
            let config = read_config(cli.config.as_deref(), overrides)?;
            let issues = validate_config(&config);
            for issue in &issues {
                let label = if issue.is_error() { "error" } else { "warning" };
                println!("{label}: {issue}");
            }
            if issues.iter().any(|i| i.is_error()) {
                return Ok(ExitCode::FAILURE);
            }
            println!("ok ({} warnings)", issues.len());
        }
        Commands::Rate { metric, value } => {
            let name = MetricName::from(metric.as_str());
            print_json(&serde_json::json!({
                "metric": name,
                "value": value,
                "rating": calculate_rating(&name, value),
                "thresholds": default_thresholds(&name),
            }))?;
        }
        Commands::TestAlert { metric, value } => {
            let config = read_config(cli.config.as_deref(), overrides)?;
            return test_alert(&config, MetricName::from(metric.as_str()), value).await;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn test_alert(config: &MonitoringConfig, metric: MetricName, value: f64) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let clock = clock::system();
    let enhancer = MetricEnhancer::new(clock.clone(), Arc::new(StaticHost::server()), CorrelationContext::new());
    let enhanced = enhancer.enhance(RawMetric::new(metric, value));

    let alert = match create_alert(&enhanced, &config.alerting.thresholds, clock.now()) {
        Ok(alert) => alert,
        Err(e) => {
            eprintln!("No alert: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let http = Arc::new(ReqwestClient::new(Duration::from_secs(10))?);
    let report = AlertDispatcher::new(http).deliver(alert, &config.alerting.channels).await;
    print_json(&report)?;

    if report.failures().next().is_some() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
