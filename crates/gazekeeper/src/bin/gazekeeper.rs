//! Gazekeeper agent binary.
//!
//! Loads layered configuration, initializes tracing, builds the configured
//! instrument driver, and runs the daemon until SIGINT. An unreachable
//! broker aborts startup before the main loop begins.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gazeconf::GazeConfig;
use gazekeeper::instrument::driver_from_config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gazekeeper", version, about = "Eye-tracker session coordinator")]
struct Args {
    /// Config file path (takes precedence over ./gazekeeper.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = GazeConfig::load_from(args.config.as_deref())?;

    if args.print_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    let filter = EnvFilter::try_new(&config.telemetry.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("gazekeeper {} starting", env!("CARGO_PKG_VERSION"));

    let discovery = driver_from_config(&config.instrument)?;
    gazekeeper::daemon::run(config, discovery).await
}
