//! Albor RLC Loopback Simulator
//!
//! Runs a gNB-side and a UE-side RLC bearer against each other over an
//! emulated lossy link and prints the resulting counters as JSON.

mod config;
mod loopback;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use config::SimConfig;

/// Albor RLC loopback simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (.yml, .yaml or .toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Number of SDUs to send
    #[arg(long)]
    sdus: Option<usize>,

    /// PDU loss probability on both directions
    #[arg(long)]
    loss: Option<f64>,

    /// Seed of the channel impairments
    #[arg(long)]
    seed: Option<u64>,

    /// Bytes granted per slot and direction
    #[arg(long)]
    grant: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(sdus) = args.sdus {
        config.traffic.num_sdus = sdus;
    }
    if let Some(loss) = args.loss {
        config.channel.loss_probability = loss;
    }
    if let Some(seed) = args.seed {
        config.channel.seed = seed;
    }
    if let Some(grant) = args.grant {
        config.traffic.grant_bytes = grant;
    }

    // Initialize logging
    let directive = args.log_level.clone().unwrap_or_else(|| config.log.filter_directive());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&directive));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Albor RLC simulator");
    if let Some(path) = &args.config {
        info!("Configuration file: {}", path);
    }
    config.validate()?;

    let sim_handle = tokio::task::spawn_blocking(move || loopback::run(&config));

    let report = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("Received shutdown signal, abandoning simulation");
            return Ok(());
        }
        result = sim_handle => result??,
    };

    if let Some(failure) = &report.failure {
        error!("Bearer failed: {}", failure);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!("Simulation complete");
    Ok(())
}
