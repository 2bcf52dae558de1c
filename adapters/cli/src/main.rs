#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays a Nightfall scenario headlessly.

mod config;
mod simulation;

use std::{path::PathBuf, time::Duration};

use anyhow::{ensure, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::simulation::RunOptions;

/// Plays nights of a scenario with a fixed simulation step.
#[derive(Debug, Parser)]
#[command(name = "nightfall", about = "Headless day/night encounter simulator")]
struct Args {
    /// Scenario file describing templates, cycle timing and nights.
    #[arg(long, default_value = "assets/nightfall.toml")]
    config: PathBuf,

    /// Number of nights to play before exiting.
    #[arg(long, default_value_t = 3)]
    nights: u32,

    /// Simulation step in milliseconds.
    #[arg(long, default_value_t = 50)]
    step_ms: u64,

    /// Seed for preset selection and random spawn points.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Declares the round lost once this night has live entities.
    #[arg(long)]
    lose_night: Option<u32>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Entry point for the Nightfall command-line interface.
fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json);
    ensure!(args.step_ms > 0, "--step-ms must be positive");

    let scenario = config::load(&args.config, args.seed)?;
    let options = RunOptions {
        nights: args.nights,
        step: Duration::from_millis(args.step_ms),
        seed: args.seed,
        lose_night: args.lose_night,
    };

    for summary in simulation::run(scenario, &options)? {
        println!("{summary}");
    }
    Ok(())
}
