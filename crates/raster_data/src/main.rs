//! `raster-data`: sets up a data module from a config file and walks its loaders.
//!
//! ```text
//! raster-data --config lyft.json --data-root /data/lyft --val-proportion 0.1 --max-batches 5
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `raster_data=info`).

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use raster_data::{Config, DataLoader, DataModule, DataModuleArgs, LoaderOverrides, Stage};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect train/validation loaders of a rasterized driving dataset")]
struct Cli {
    /// JSON configuration with train_dataloader/val_dataloader/raster_params/model_params
    #[arg(long)]
    config: PathBuf,

    #[command(flatten)]
    data: DataModuleArgs,

    /// Setup stage
    #[arg(long, value_enum)]
    stage: Option<Stage>,

    /// Batches to pull from each loader (all when unset)
    #[arg(long)]
    max_batches: Option<usize>,
}

fn walk(name: &str, loader: &DataLoader, max_batches: Option<usize>) -> Result<()> {
    let start = Instant::now();
    let limit = max_batches.unwrap_or(usize::MAX);
    let mut batches = 0;

    for batch in loader.iter()?.take(limit) {
        let batch = batch.with_context(|| format!("{} batch {} failed", name, batches))?;
        if batches == 0 {
            for feature in batch.features() {
                tracing::info!(loader = name, feature, shape = ?batch.get(feature)?.size(), "first batch");
            }
        }
        batches += 1;
    }

    tracing::info!(
        loader = name,
        batches,
        total_batches = loader.len(),
        samples = loader.dataset().len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "walked loader"
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("raster_data=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_json_file(&cli.config)?;

    let mut module = DataModule::from_args(cli.data, config)?;
    module.setup(cli.stage)?;

    if module.train_data().is_none() {
        tracing::info!(stage = ?cli.stage, "no views built for this stage");
        return Ok(());
    }

    let train = module.train_dataloader(LoaderOverrides::default())?;
    walk("train", &train, cli.max_batches)?;

    let val = module.val_dataloader(LoaderOverrides::default())?;
    walk("val", &val, cli.max_batches)?;

    if let Some(source) = module.train_source() {
        let stats = source.cache_stats()?;
        tracing::info!(
            hits = stats.hits,
            misses = stats.misses,
            resident_bytes = stats.resident_bytes,
            "train chunk cache"
        );
    }
    Ok(())
}
