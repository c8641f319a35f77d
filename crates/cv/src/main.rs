//! Shiptime k-fold trainer CLI
//!
//! Trains one booster per fold, averages their test predictions into a
//! submission file and records every fold with the experiment tracker.

use anyhow::{Context, Result};
use clap::Parser;
use shiptime_cv::{pipeline, tracking, RunConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shiptime-train")]
#[command(author = "Shiptime Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "K-fold GBDT trainer for shipping-time prediction", long_about = None)]
struct Args {
    /// TOML run configuration; omitted fields keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Combined train/test CSV
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Submission template CSV
    #[arg(long)]
    template: Option<PathBuf>,

    /// Directory for the submission file
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of folds
    #[arg(long)]
    folds: Option<usize>,

    /// Seed for fold shuffling and training
    #[arg(long)]
    seed: Option<u64>,

    /// Ceiling on boosting rounds per fit
    #[arg(long)]
    num_boost_round: Option<usize>,

    /// Train with fixed parameters instead of searching
    #[arg(long)]
    no_tune: bool,

    /// Tracking store directory or http(s) server URI
    #[arg(long)]
    tracking_uri: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => RunConfig::new(),
        };

        if let Some(dataset) = self.dataset {
            config.data.dataset = dataset;
        }
        if let Some(template) = self.template {
            config.data.template = template;
        }
        if let Some(output_dir) = self.output_dir {
            config.data.output_dir = output_dir;
        }
        if let Some(folds) = self.folds {
            config.cv.n_folds = folds;
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(rounds) = self.num_boost_round {
            config.training.num_boost_round = rounds;
        }
        if self.no_tune {
            config.training.tune = false;
        }
        if let Some(uri) = self.tracking_uri {
            config.tracking.uri = uri;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("Failed to set tracing subscriber: {}", err))?;

    info!("Shiptime k-fold trainer v{}", env!("CARGO_PKG_VERSION"));

    let config = args.into_config()?;

    info!("Training configuration:");
    info!("  Dataset: {}", config.data.dataset.display());
    info!("  Folds: {} (seed {})", config.cv.n_folds, config.cv.seed);
    info!("  Boosting rounds: {}", config.training.num_boost_round);
    info!("  Early stopping: {}", config.training.early_stopping_rounds);
    info!("  Parameter search: {}", config.training.tune);
    info!("  Tracking: {}", config.tracking.uri);

    let tracker = tracking::from_uri(&config.tracking.uri)
        .with_context(|| format!("Failed to open tracking store {}", config.tracking.uri))?;

    let summary = pipeline::run(&config, tracker.as_ref()).context("Training run failed")?;

    info!("Run {} complete", summary.run_name);
    for fold in &summary.folds {
        info!(
            "  Fold {}: rmse {:.6} at iteration {}",
            fold.fold, fold.best_score, fold.best_iteration
        );
    }
    info!("  CV rmse: {:.6}", summary.score);
    info!("  Score: {:.2}", summary.leaderboard_score());
    info!("  Submission: {}", summary.submission.display());

    println!("{}", summary.score);

    Ok(())
}
