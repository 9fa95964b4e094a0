use anyhow::{Context, Result};
use clap::Parser;
use flocking_analysis::pipeline::process_sweep;
use flocking_analysis::SweepAccumulator;
use flocking_common::AnalysisConfig;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::Instant;

/// Command-line arguments for the analysis pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Analysis configuration file (TOML)
    #[arg(short, long, default_value = "analysis.toml")]
    config: PathBuf,

    /// Parameter group directory to process (repeatable); replaces the configured groups
    #[arg(short, long)]
    group: Vec<PathBuf>,

    /// Sweep dataset to append to; replaces output.sweep_path
    #[arg(long)]
    sweep: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("Starting flocking analysis...");

    // --- Load Configuration ---
    let mut config = AnalysisConfig::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    if !args.group.is_empty() {
        config.input.groups = args.group;
    }
    if let Some(sweep_path) = args.sweep {
        config.output.sweep_path = sweep_path;
    }
    if config.input.groups.is_empty() {
        anyhow::bail!("No parameter groups to process: set input.groups or pass --group.");
    }
    debug!("Analysis configuration: {:#?}", config);

    info!("Using {} Rayon threads.", rayon::current_num_threads());
    info!(
        "Stationarity: threshold = {}, min_stable_run = {}",
        config.stationarity.threshold, config.stationarity.min_stable_run
    );

    let sweep =
        SweepAccumulator::with_precision(&config.output.sweep_path, config.output.precision);
    let start_time = Instant::now();
    let summary = process_sweep(&config.input.groups, &config, &sweep);

    info!(
        "Processed {} of {} groups in {:.2} s. Sweep dataset: {}",
        summary.processed,
        config.input.groups.len(),
        start_time.elapsed().as_secs_f64(),
        sweep.path().display()
    );
    for (dir, reason) in &summary.failed {
        warn!("Skipped {}: {}", dir.display(), reason);
    }

    if summary.processed == 0 {
        error!("Every parameter group failed.");
        anyhow::bail!("No parameter group could be processed.");
    }
    Ok(())
}
