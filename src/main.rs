use anyhow::Result;
use clap::{Parser, Subcommand};
use leadcast::commands::{analyze, momentum, scenarios, train, validate};
use leadcast::config::{AppConfig, GbdtParams};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "leadcast")]
#[command(about = "Seasonal lead forecasting from calendar timing and daily weather")]
struct Cli {
    /// Directory holding the per-year lead export CSVs
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    /// Directory for report and artifact output
    #[arg(long, global = true, value_name = "PATH")]
    output_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: ingest, fetch weather, merge, analyze, train, report
    Analyze,
    /// Train the lead models from the merged artifact
    Train {
        /// Number of boosting iterations
        #[arg(long)]
        n_trees: Option<usize>,
        /// Maximum tree depth
        #[arg(long)]
        max_depth: Option<usize>,
        /// Learning rate
        #[arg(long)]
        learning_rate: Option<f64>,
        /// Fraction of rows sampled per tree (0..=1)
        #[arg(long)]
        subsample: Option<f64>,
        /// Minimum number of observations in one leaf
        #[arg(long)]
        min_samples_leaf: Option<usize>,
        /// Random seed for row subsampling
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Holdout test: train on earlier seasons, score the held-out one blind
    Validate,
    /// Streak/transition momentum analyses and the enhanced-model comparison
    Momentum,
    /// Score what-if weather scenarios and build the seasonal projection
    Scenarios,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = AppConfig::default();
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }
    config.validate()?;

    info!(
        "Season window {:02}-{:02}..{:02}-{:02}, seasons {:?}",
        config.season_start.0,
        config.season_start.1,
        config.season_end.0,
        config.season_end.1,
        config.full_years
    );

    match cli.command {
        Commands::Analyze => analyze::run(&config, GbdtParams::default())?,
        Commands::Train {
            n_trees,
            max_depth,
            learning_rate,
            subsample,
            min_samples_leaf,
            seed,
        } => {
            let defaults = GbdtParams::default();
            let params = GbdtParams {
                n_trees: n_trees.unwrap_or(defaults.n_trees),
                max_depth: max_depth.unwrap_or(defaults.max_depth),
                learning_rate: learning_rate.unwrap_or(defaults.learning_rate),
                subsample: subsample.unwrap_or(defaults.subsample),
                min_samples_leaf: min_samples_leaf.unwrap_or(defaults.min_samples_leaf),
                seed: seed.unwrap_or(defaults.seed),
            };
            train::run(&config, params)?;
        }
        Commands::Validate => validate::run(&config, GbdtParams::default())?,
        Commands::Momentum => momentum::run(&config, GbdtParams::default())?,
        Commands::Scenarios => scenarios::run(&config, GbdtParams::default())?,
    }

    Ok(())
}
