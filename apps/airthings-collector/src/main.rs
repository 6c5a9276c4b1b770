mod airthings;
mod collector;
mod config;
mod error;
mod line_protocol;
mod record;
mod sink;
#[cfg(test)]
mod test_support;

use crate::collector::Collector;
use crate::config::Config;
use crate::error::CollectError;
use crate::sink::LineProtocolSink;
use anyhow::Result;
use clap::Parser;
use tokio::time::MissedTickBehavior;

#[derive(Parser, Debug)]
#[command(
    name = "airthings-collector",
    about = "Poll the Airthings consumer API and write device metrics as line protocol"
)]
struct Args {
    /// Run a single collection cycle and exit.
    #[arg(long)]
    once: bool,
    /// Print the resolved configuration (secret redacted) and exit.
    #[arg(long)]
    print_config: bool,
}

fn init_tracing(config: &Config) -> Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as OTelTraceConfig, Resource};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,airthings_collector=info".into());
    // stdout carries line protocol, so logs go to stderr.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    if let Some(endpoint) = &config.otlp_endpoint {
        let endpoint = normalize_otlp_http_endpoint(endpoint);
        let exporter = opentelemetry_otlp::new_exporter()
            .http()
            .with_endpoint(endpoint);
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(OTelTraceConfig::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "airthings-collector"),
            ])))
            .install_batch(Tokio)?;

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

fn normalize_otlp_http_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.contains("/v1/traces") {
        return trimmed.to_string();
    }
    format!("{}/v1/traces", trimmed.trim_end_matches('/'))
}

fn log_cycle_failure(err: &anyhow::Error) {
    let status = err
        .downcast_ref::<CollectError>()
        .and_then(CollectError::status_code);
    tracing::warn!(status = ?status, "airthings collection cycle failed: {err:#}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;
    if args.print_config {
        print!("{}", config.redacted());
        return Ok(());
    }
    init_tracing(&config)?;
    if let Some(warning) = &config.override_warning {
        tracing::warn!("airthings-collector ignored its config file: {warning}");
    }

    let mut collector = Collector::new(&config)?;
    let mut sink = LineProtocolSink::new(std::io::stdout());

    if args.once {
        return match collector.run_cycle(&mut sink, config.cycle_timeout()).await {
            Ok(_) => Ok(()),
            Err(err) => {
                log_cycle_failure(&err);
                Err(err)
            }
        };
    }

    tracing::info!(
        url = %config.api_url,
        interval_secs = config.interval_secs,
        show_inactive = config.show_inactive,
        "airthings-collector started"
    );
    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = collector.run_cycle(&mut sink, config.cycle_timeout()).await {
                    log_cycle_failure(&err);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
