use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::warn;
use tripwire::{TripwireEngine, settings::Settings, telemetry};

#[derive(Debug, Parser)]
#[clap(version, about = "Exec tracing tripwire agent")]
struct Opt {
    /// YAML configuration file
    #[clap(short, long, env = "TRIPWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    let settings =
        Settings::new(opt.config.as_deref()).context("Failed to load configuration")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_filter(opt.verbose)),
    )
    .init();

    if let Err(e) = telemetry::init_metrics(settings.otel_exporter_otlp_endpoint.as_deref()) {
        warn!("Failed to initialize metrics: {:#}", e);
    }

    let engine = TripwireEngine::new(
        settings,
        aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/tripwire")),
    )?;
    engine.run().await
}
