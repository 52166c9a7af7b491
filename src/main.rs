//! Ecomine CLI
//!
//! Mines merge-outcome predictors from pull-request and issue streams.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ecomine::{
    chunks::{self, RunParams, RunSummary},
    config::Config,
    deps::DependencyMap,
    features::FeatureFactory,
    VERSION,
};
use log::info;

#[derive(Parser)]
#[command(name = "ecomine")]
#[command(version = VERSION)]
#[command(about = "Sliding-window predictor mining over software ecosystem activity", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the predictor dataset from event streams
    Dataset {
        /// Pull-request NDJSON datasets, chronologically sorted
        #[arg(long = "pull-requests", short = 'p', value_delimiter = ',')]
        pr_datasets: Vec<PathBuf>,

        /// Issue NDJSON datasets, chronologically sorted
        #[arg(long = "issues", short = 'i', value_delimiter = ',')]
        issue_datasets: Vec<PathBuf>,

        /// Sliding window size in days (0 disables pruning)
        #[arg(long)]
        window_days: Option<i64>,

        /// Number of chunk workers
        #[arg(long)]
        workers: Option<usize>,

        /// Output CSV path
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Skip the collaboration graph and centrality features
        #[arg(long)]
        no_graph: bool,

        /// Skip the dependency map and its scoped features
        #[arg(long)]
        no_deps: bool,

        /// Only process the first N chunks
        #[arg(long)]
        chunk_limit: Option<usize>,
    },

    /// Rebuild the project dependency cache from the bulk CSV datasets
    Deps,

    /// Show the effective configuration
    Config,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Dataset {
            pr_datasets,
            issue_datasets,
            window_days,
            workers,
            output,
            no_graph,
            no_deps,
            chunk_limit,
        } => cmd_dataset(
            pr_datasets,
            issue_datasets,
            window_days,
            workers,
            output,
            no_graph,
            no_deps,
            chunk_limit,
        ),
        Commands::Deps => cmd_deps(),
        Commands::Config => cmd_config(),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_dataset(
    pr_datasets: Vec<PathBuf>,
    issue_datasets: Vec<PathBuf>,
    window_days: Option<i64>,
    workers: Option<usize>,
    output: Option<PathBuf>,
    no_graph: bool,
    no_deps: bool,
    chunk_limit: Option<usize>,
) -> Result<()> {
    let started = Instant::now();
    let mut config = Config::load().context("loading configuration")?;

    if !pr_datasets.is_empty() {
        config.pr_datasets = pr_datasets;
    }
    if !issue_datasets.is_empty() {
        config.issue_datasets = issue_datasets;
    }
    if let Some(days) = window_days {
        config.window_days = (days > 0).then_some(days);
    }
    if let Some(workers) = workers {
        config.workers = workers;
    }
    if let Some(output) = output {
        config.output_path = output;
    }
    if config.pr_datasets.is_empty() && config.issue_datasets.is_empty() {
        bail!("no input datasets; pass --pull-requests and/or --issues");
    }
    config.ensure_directories().context("preparing directories")?;

    let deps = if no_deps {
        None
    } else {
        let map = DependencyMap::load(&config.dependency_cache_path, &config.bulk_paths())
            .context("loading dependency map")?;
        Some(Arc::new(map))
    };

    match config.window_duration() {
        Some(window) => info!("window size: {} day(s)", window.num_days()),
        None => info!("window size: unbounded"),
    }

    let factory = FeatureFactory::new(!no_graph, deps);
    let summary = chunks::run(RunParams {
        pr_datasets: config.pr_datasets.clone(),
        issue_datasets: config.issue_datasets.clone(),
        window_size: config.window_duration(),
        workers: config.workers,
        output_path: config.output_path.clone(),
        temp_dir: config.temp_path.clone(),
        factory,
        chunk_limit,
    })
    .context("running pipeline")?;

    print_summary(&summary, &config);
    println!("Finished in {:.1?}", started.elapsed());
    Ok(())
}

fn print_summary(summary: &RunSummary, config: &Config) {
    println!();
    println!(
        "Wrote {} row(s) from {} chunk(s) to {:?}",
        summary.rows, summary.chunks, config.output_path
    );

    if !summary.edges_added.is_empty() {
        println!();
        println!("Collaboration graph edges added:");
        for (label, count) in &summary.edges_added {
            println!("  {label}: {count}");
        }
    }

    let report = summary.invalid.report();
    if report.is_empty() {
        println!();
        println!("No invalid entries encountered.");
    } else {
        println!();
        println!(
            "Invalid entries per feature (of {} processed):",
            summary.invalid.events_seen
        );
        for (name, count) in report {
            let fraction = count as f64 / summary.invalid.events_seen.max(1) as f64;
            println!("  {name}: {count} ({:.1}%)", fraction * 100.0);
        }
    }
}

fn cmd_deps() -> Result<()> {
    let config = Config::load().context("loading configuration")?;

    if config.dependency_cache_path.exists() {
        std::fs::remove_file(&config.dependency_cache_path)
            .context("removing stale dependency cache")?;
    }
    let map = DependencyMap::load(&config.dependency_cache_path, &config.bulk_paths())
        .context("rebuilding dependency map")?;

    println!("Dependency map rebuilt:");
    println!("  projects: {}", map.project_count());
    println!("  dependency edges: {}", map.edge_count());
    println!("  cache: {:?}", config.dependency_cache_path);
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().context("loading configuration")?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
    Ok(())
}
