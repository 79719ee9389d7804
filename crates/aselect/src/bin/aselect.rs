//! Command-line driver.
//!
//! Usage:
//!   aselect run --features features.json --performance performance.json \
//!       --config config.json [--out report.json] [--threads N] [--seed S] [-v]
//!   aselect synthetic --out-dir DIR [--seed S]
//!
//! Inputs are JSON arrays of records:
//!
//! ```json
//! [{"dimension": 2, "function_id": 1, "features": {"ela_meta.lin_simple.adj_r2": 0.41}}]
//! [{"dimension": 2, "function_id": 1, "ert": {"BIPOP-CMA-ES": 1520.0, "LSstep": null}}]
//! ```
//!
//! `null` marks a run that did not converge. The config is a JSON
//! [`RunConfig`]; omitted fields take their defaults. Logging goes to stderr
//! and honors `RUST_LOG`.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use aselect::data::{FeatureRecord, FeatureTable, PerformanceRecord, PerformanceTable};
use aselect::testing::{SyntheticSpec, synthetic_records};
use aselect::{Error, Pipeline, RunConfig};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "aselect", version, about = "Per-instance algorithm selection for black-box optimization")]
struct Cli {
    /// Log debug output (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate every configured selector combination with LOOCV.
    Run {
        /// Feature records (JSON).
        #[arg(long)]
        features: PathBuf,
        /// Performance records (JSON).
        #[arg(long)]
        performance: PathBuf,
        /// Run configuration (JSON).
        #[arg(long)]
        config: PathBuf,
        /// Report destination; stdout if omitted.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Override the configured thread count (0 = all cores).
        #[arg(long)]
        threads: Option<usize>,
        /// Override the configured seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Write a small synthetic benchmark (features, performance, config).
    Synthetic {
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> Result<(), Error> {
    match path {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, value)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn run(
    features: &Path,
    performance: &Path,
    config: &Path,
    out: Option<&Path>,
    threads: Option<usize>,
    seed: Option<u64>,
) -> Result<(), Error> {
    let mut config: RunConfig = read_json(config)?;
    if let Some(threads) = threads {
        config.n_threads = threads;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    let pipeline = Pipeline::new(config)?;

    let features = FeatureTable::from_records(&read_json::<Vec<FeatureRecord>>(features)?)?;
    let performance =
        PerformanceTable::from_records(&read_json::<Vec<PerformanceRecord>>(performance)?)?;
    tracing::info!(
        combinations = pipeline.config().n_combinations(),
        "inputs loaded"
    );

    let report = pipeline.run(&features, &performance)?;
    write_json(&report, out)
}

fn synthetic(out_dir: &Path, seed: u64) -> Result<(), Error> {
    let spec = SyntheticSpec {
        seed,
        ..Default::default()
    };
    let (features, performance) = synthetic_records(&spec);
    let config = RunConfig::builder()
        .solvers(spec.solvers.clone())
        .baseline(spec.baseline.clone())
        .dimensions(spec.dimensions.clone())
        .function_ids(spec.function_ids.clone())
        .seed(seed)
        .build()?;

    fs::create_dir_all(out_dir)?;
    write_json(&features, Some(&out_dir.join("features.json")))?;
    write_json(&performance, Some(&out_dir.join("performance.json")))?;
    write_json(&config, Some(&out_dir.join("config.json")))?;
    tracing::info!(dir = %out_dir.display(), instances = features.len(), "synthetic benchmark written");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Command::Run {
            features,
            performance,
            config,
            out,
            threads,
            seed,
        } => run(features, performance, config, out.as_deref(), *threads, *seed),
        Command::Synthetic { out_dir, seed } => synthetic(out_dir, *seed),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "run failed");
            ExitCode::FAILURE
        }
    }
}
