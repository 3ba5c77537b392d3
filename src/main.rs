use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use entmax_forge::core::domain::{Params, PotentialKind};
use entmax_forge::engine::external::gulp::GulpPotential;
use entmax_forge::engine::lennard_jones::LennardJones;
use entmax_forge::engine::potential::Potential;
use entmax_forge::pipeline::io::read_json;
use entmax_forge::pipeline::{FolderStatus, Pipeline, Stage};

// --- CLI Definitions ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Entropy-maximizing structure generation and selection", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Data directory holding one mp-* folder per seed structure
    #[arg(short, long, default_value = "data", global = true)]
    data: PathBuf,

    /// JSON file with run parameters (defaults apply for missing keys)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    /// Base seed for all random choices
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Weight of the novelty term
    #[arg(short, long, global = true)]
    kfactor: Option<f64>,

    /// FIRE step budget per seed
    #[arg(long, global = true)]
    steps: Option<usize>,

    /// Structures to keep per seed
    #[arg(short, long, global = true)]
    n_select: Option<usize>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Rattle and relax every seed under the novelty-biased potential
    Generate,
    /// Fingerprint every trajectory frame
    Fingerprint,
    /// Cluster fingerprints and select representatives
    Cluster,
    /// Combine all selections into one dataset
    Merge,
    /// All stages in order
    Run,
}

fn load_params(args: &Args) -> Result<Params> {
    let mut params: Params = match &args.config {
        Some(path) => read_json(path).context("Failed to load config")?,
        None => Params::default(),
    };
    if let Some(t) = args.threads {
        params.threads = t;
    }
    if args.seed.is_some() {
        params.seed = args.seed;
    }
    if let Some(k) = args.kfactor {
        params.kfactor = k;
    }
    if let Some(s) = args.steps {
        params.max_steps = s;
    }
    if let Some(n) = args.n_select {
        params.n_select = n;
    }
    Ok(params)
}

fn build_potential(kind: &PotentialKind) -> Result<Arc<dyn Potential>> {
    match kind {
        PotentialKind::LennardJones {
            epsilon,
            sigma,
            cutoff,
        } => {
            let lj: Arc<dyn Potential> = Arc::new(LennardJones::new(*epsilon, *sigma, *cutoff));
            Ok(lj)
        }
        PotentialKind::Gulp {
            executable,
            library,
        } => {
            let block = std::fs::read_to_string(library)
                .with_context(|| format!("Failed to read potential library {}", library.display()))?;
            let gulp = GulpPotential::new(executable, block.trim());
            gulp.check_available()?;
            let gulp: Arc<dyn Potential> = Arc::new(gulp);
            Ok(gulp)
        }
    }
}

// --- Main ---

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let params = load_params(&args)?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(params.threads)
        .build_global()
        .context("Failed to build thread pool")?;

    let base = build_potential(&params.potential)?;
    info!("Base potential: {}", base.name());

    let pipeline = Pipeline::new(args.data.clone(), params, base);
    let stages: &[Stage] = match args.command {
        Command::Generate => &[Stage::Generate],
        Command::Fingerprint => &[Stage::Fingerprint],
        Command::Cluster => &[Stage::Cluster],
        Command::Merge => &[Stage::Merge],
        Command::Run => &Stage::ALL,
    };

    let mut failures = 0;
    for &stage in stages {
        let reports = pipeline.run(stage)?;
        failures += reports
            .iter()
            .filter(|r| matches!(r.status, FolderStatus::Failed(_)))
            .count();
    }

    if failures > 0 {
        anyhow::bail!("{} folder stage(s) failed, see log", failures);
    }
    Ok(())
}
