use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use losscone::{FailurePolicy, FitConfig, FitPipeline, SharpLossCone};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fit_surface_potential")]
#[command(about = "Fit lunar surface potential to ER loss-cone sweeps", long_about = None)]
struct Args {
    /// Whitespace-delimited ER data file
    er_data: PathBuf,

    /// Theta file with one channel polar angle (degrees) per line
    thetas: PathBuf,

    /// Output CSV path
    #[arg(short, long, default_value = "surface_potential.csv")]
    output: PathBuf,

    /// JSON fitting configuration (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fit chunks in parallel
    #[arg(long)]
    parallel: bool,

    /// Record chunks whose fit fails as NaN rows instead of aborting
    #[arg(long)]
    isolate_failures: bool,

    /// Wall-clock budget per chunk, seconds
    #[arg(long)]
    max_fit_seconds: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => FitConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => FitConfig::default(),
    };
    config.parallel |= args.parallel;
    if args.isolate_failures {
        config.failure_policy = FailurePolicy::Isolate;
    }
    if args.max_fit_seconds.is_some() {
        config.max_fit_seconds = args.max_fit_seconds;
    }

    let pipeline = FitPipeline::from_files(&args.er_data, &args.thetas, config)
        .context("preparing fit pipeline")?;
    let report = pipeline.cleaning_report();
    info!(
        "{} of {} rows kept after removing {} sweeps",
        pipeline.dataset().len(),
        report.original_rows,
        report.sweeps_removed()
    );

    let table = pipeline
        .fit_all(&SharpLossCone)
        .context("fitting surface potential")?;
    table
        .write_csv(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!(
        "Wrote {} chunk fits ({} converged) to {}",
        table.len(),
        table.fitted_count(),
        args.output.display()
    );
    Ok(())
}
