// Region Limiter - Main Entry Point
//
// CLI around the region selector:
// - one-shot admission requests
// - traffic status across regions
// - synthetic traffic simulation with per-region measurements

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use region_limiter::config::Config;
use region_limiter::rate_limit::{MemoryQuotaStore, RandomTieBreaker, RegionSelector};
use region_limiter::simulate::{self, SimulationPlan};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Region Limiter: load-aware admission control across quota'd regions
#[derive(Parser, Debug)]
#[command(name = "region-limiter")]
#[command(author = "Region Limiter Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Route work to the least loaded rate-limited region", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use an in-process store instead of Redis
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Request admission and print the result as JSON
    Consume {
        /// Number of requests to issue
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Print the current traffic of every region
    Status,
    /// Generate synthetic traffic and write per-region measurements
    Simulate {
        /// Trials per minute as a multiple of the combined quota
        #[arg(long, default_value_t = 2.5)]
        coefficient: f64,

        /// Minutes worth of trials to run
        #[arg(long, default_value_t = 3)]
        minutes: u64,

        /// Where to write the measurement JSON
        #[arg(short, long, default_value = "data.json")]
        output: PathBuf,

        /// Seed for reproducible tie-breaking
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    // Initialize tracing
    let filter = if args.verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };
    let builder = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(filter.into())
                .from_env_lossy(),
        );
    if config.logging.format.eq_ignore_ascii_case("pretty") {
        builder.pretty().init();
    } else {
        builder.compact().init();
    }

    let mut selector = build_selector(&config, args.memory)?;
    if let Commands::Simulate { seed: Some(seed), .. } = &args.command {
        selector = selector.with_tie_breaker(RandomTieBreaker::with_seed(*seed));
    }
    selector
        .register_all(&config.regions)
        .await
        .context("Failed to register regions")?;

    match args.command {
        Commands::Consume { count } => {
            for _ in 0..count {
                let result = selector.consume().await?;
                println!("{}", serde_json::to_string(&result)?);
            }
        }
        Commands::Status => {
            let traffic = selector.traffic().await?;
            println!("{}", serde_json::to_string_pretty(&traffic)?);
        }
        Commands::Simulate {
            coefficient,
            minutes,
            output,
            ..
        } => {
            let plan = SimulationPlan::from_regions(&config.regions, coefficient, minutes)
                .with_jitter(0.1);
            let report = simulate::run(&selector, &plan).await?;

            fs::write(&output, serde_json::to_string_pretty(&report.measurement)?)
                .with_context(|| format!("Failed to write measurement to {:?}", output))?;
            info!(
                "Wrote measurement for {} requests to {:?}",
                report.requested, output
            );
        }
    }

    Ok(())
}

fn build_selector(config: &Config, memory: bool) -> Result<RegionSelector> {
    if memory {
        info!("Using in-memory quota store");
        return Ok(RegionSelector::with_store(
            config.limiter.clone(),
            Arc::new(MemoryQuotaStore::new()),
        )?);
    }
    redis_selector(config)
}

#[cfg(feature = "redis-store")]
fn redis_selector(config: &Config) -> Result<RegionSelector> {
    info!("Using quota store at {}", config.limiter.store_url());
    Ok(RegionSelector::new(config.limiter.clone())?)
}

#[cfg(not(feature = "redis-store"))]
fn redis_selector(_config: &Config) -> Result<RegionSelector> {
    anyhow::bail!("Built without the redis-store feature; pass --memory")
}
