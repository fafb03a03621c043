//! Command-line entry point: split scanned pages into per-receipt crops.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tillcut_core::{DetectionOutcome, DetectorConfig};
use tillcut_detect::ReceiptDetector;
use tokio::sync::Semaphore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "tillcut", version, about = "Detect and crop receipts on scanned pages")]
struct Args {
    /// TOML file with detector thresholds
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for crop files (overrides the config)
    #[arg(long, value_name = "DIR")]
    crops_dir: Option<PathBuf>,

    /// Pages processed at once
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,

    /// Print outcomes as JSON
    #[arg(long)]
    json: bool,

    /// Page images to segment
    #[arg(required = true, value_name = "IMAGES")]
    images: Vec<PathBuf>,
}

fn load_config(args: &Args) -> Result<DetectorConfig> {
    let config = match &args.config {
        Some(path) => DetectorConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => DetectorConfig::default(),
    };
    Ok(match &args.crops_dir {
        Some(dir) => config.with_crops_dir(dir),
        None => config,
    })
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, usize::from)
}

/// Detect every page on the blocking pool, at most `jobs` at a time,
/// returning outcomes in input order.
async fn detect_all(
    detector: Arc<ReceiptDetector>,
    pages: Vec<PathBuf>,
    jobs: usize,
) -> Result<Vec<DetectionOutcome>> {
    let permits = Arc::new(Semaphore::new(jobs.max(1)));
    let mut handles = Vec::with_capacity(pages.len());

    for page in pages {
        let permit = permits.clone().acquire_owned().await?;
        let detector = detector.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            detector.detect(&page)
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.await.context("Detection task panicked")?);
    }
    Ok(outcomes)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let jobs = args.jobs.unwrap_or_else(default_jobs);
    tracing::info!(
        pages = args.images.len(),
        jobs,
        crops_dir = %config.assemble.crops_dir.display(),
        "Starting receipt detection"
    );

    let detector = Arc::new(ReceiptDetector::new(config));
    let outcomes = detect_all(detector, args.images.clone(), jobs).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for outcome in &outcomes {
            for path in outcome.paths() {
                println!("{}", path.display());
            }
        }
    }

    for outcome in outcomes.iter().filter(|o| o.is_fallback()) {
        let summary = outcome.rejection_summary();
        tracing::warn!(
            page = %outcome.source.display(),
            rejected = summary.total(),
            by_stage = ?summary.by_stage,
            "Page was not segmented"
        );
    }

    let fallbacks = outcomes.iter().filter(|o| o.is_fallback()).count();
    tracing::info!(
        pages = outcomes.len(),
        crops = outcomes
            .iter()
            .filter(|o| !o.is_fallback())
            .map(|o| o.entries.len())
            .sum::<usize>(),
        fallbacks,
        "Done"
    );
    Ok(())
}
