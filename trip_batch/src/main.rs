//! Batch feature builder: raw trip export to train/val/test tables.

use anyhow::{Context, Result};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trip_features::{
    batch::read_raw_trips_from_path, build_training_table, BatchReport, PipelineConfig,
    SchemaCatalog, ZoneLookup,
};

#[derive(Parser, Debug)]
#[command(name = "trip-batch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build encoded training tables from raw taxi trips", long_about = None)]
struct Args {
    /// Pipeline config (JSON). Falls back to config/pipeline.json or pipeline.json
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Raw trip CSV
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Taxi zone lookup CSV
    #[arg(short, long)]
    zones: Option<PathBuf>,

    /// Output directory for train/val/test tables
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Reconcile against an existing schema file instead of deriving one
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Keep physically invalid rows
    #[arg(long)]
    no_filter: bool,

    /// Carry source trip ids through the run
    #[arg(long)]
    keep_trip_id: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("trip-batch v{}", env!("CARGO_PKG_VERSION"));

    let cfg = load_config(&args)?;
    info!("config: {:?}", cfg);

    let zones = ZoneLookup::from_csv(&cfg.zones_path)
        .with_context(|| format!("failed to load zones from {}", cfg.zones_path.display()))?;

    let catalog = match &args.schema {
        Some(path) => {
            let c = SchemaCatalog::load(path, &cfg.target_column)
                .with_context(|| format!("failed to load schema {}", path.display()))?;
            info!("reusing schema with {} columns from {}", c.len(), path.display());
            Some(c)
        }
        None => None,
    };

    info!("reading trips from {}", cfg.data_path.display());
    let mut report = BatchReport::default();
    let raw = read_raw_trips_from_path(&cfg.data_path, &mut report)
        .with_context(|| format!("failed to read {}", cfg.data_path.display()))?;

    let table = build_training_table(raw, Arc::new(zones), catalog, &cfg.batch_options(), report)
        .context("failed to build training table")?;
    if table.is_empty() {
        warn!("no rows survived filtering; writing empty tables");
    }

    std::fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("failed to create {}", cfg.output_dir.display()))?;

    let split = table.split(cfg.train_fraction, cfg.val_fraction);
    for (name, rows) in [
        (&cfg.train_file, split.train),
        (&cfg.val_file, split.val),
        (&cfg.test_file, split.test),
    ] {
        let path = cfg.output_dir.join(name);
        table
            .write_csv(&path, rows)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote {} rows to {}", rows.len(), path.display());
    }

    info!(
        "done: {} feature columns, schema at {}",
        table.catalog.len(),
        cfg.schema_path().display()
    );
    Ok(())
}

/// File config (explicit, then conventional locations, then defaults) with
/// command-line overrides applied on top.
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut cfg = match args.config.clone().or_else(resolve_config_path) {
        Some(path) => {
            info!("loading config from {}", path.display());
            PipelineConfig::load(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?
        }
        None => {
            info!("no config file found, using defaults");
            PipelineConfig::default()
        }
    };

    if let Some(p) = &args.data {
        cfg.data_path = p.clone();
    }
    if let Some(p) = &args.zones {
        cfg.zones_path = p.clone();
    }
    if let Some(p) = &args.output {
        cfg.output_dir = p.clone();
    }
    if args.no_filter {
        cfg.remove_invalid = false;
    }
    if args.keep_trip_id {
        cfg.keep_trip_id = true;
    }
    Ok(cfg)
}

fn resolve_config_path() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("config/pipeline.json"),
        PathBuf::from("pipeline.json"),
        {
            let mut p = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
            p.pop(); // exe dir
            p.push("config/pipeline.json");
            p
        },
    ];
    candidates.into_iter().find(|c| c.exists())
}
