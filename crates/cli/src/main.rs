mod cli;
mod monitor;
mod recorder;
mod simulation;
mod workload;

use anyhow::{Context, Result};
use clap::Parser;
use edgeplay_core::{config::load_dotenv, SimConfig};
use tracing::info;

use crate::cli::CliArgs;

fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    // File and EDGEPLAY_* env first, explicit flags on top.
    let mut config =
        SimConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate();
    config.log_summary();

    let report = simulation::run(&config)?;
    let files = recorder::save(&config.output.data_dir, &report.data, &report.summary)?;

    info!(
        avg = %files.avg.display(),
        var = %files.var.display(),
        max = %files.max.display(),
        summary = %files.summary.display(),
        "done"
    );
    Ok(())
}
