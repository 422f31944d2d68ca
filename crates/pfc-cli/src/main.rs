//! pfcalib CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cache;
mod compare;
mod config;
mod context;
mod eval;
mod figures;
mod fit_params;
mod inputs;
mod mva_pars;
mod overtraining;
mod pfsize;
mod results;
mod slices;
mod train;

use context::RunContext;

#[derive(Parser)]
#[command(name = "pfcalib")]
#[command(about = "pfcalib - PFCluster photon energy calibration")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// Configuration file (YAML, or JSON by extension). Defaults apply without one.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of input ntuples (overrides the config)
    #[arg(long, global = true)]
    input_dir: Option<PathBuf>,

    /// Output directory (overrides the config)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Threads (0 = auto; overrides the config when set)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Recompute everything instead of reading cached results
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Distributions of the regression inputs and of the generated photons
    Inputs,

    /// Train the energy regressions
    Train {
        /// Only the ntuple with this file stem
        #[arg(long)]
        ntuple: Option<String>,

        /// Only this model (e.g. ws_mva_EB_pfSize1)
        #[arg(long)]
        only: Option<String>,
    },

    /// Evaluate every training on every ntuple into friend tables
    Eval,

    /// Response and resolution graphs before and after correction
    Results,

    /// Corrected response distributions in pT and |eta| regions
    Slices,

    /// Observed versus predicted width of the corrected response
    MvaPars,

    /// Corrected response of the training and test halves
    Overtraining,

    /// Cluster-size composition versus truth pT
    Pfsize,

    /// Standalone fits of E^gen/E^PF in blocks of truth pT
    FitParams {
        /// Cluster size: n > 0 exactly n, n < 0 at least |n|, 0 all
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        pf_size: i32,
    },

    /// Compare the cached results of two calibration versions
    Compare {
        /// First version (reads <base-dir>/output_<first>)
        first: String,

        /// Second version
        second: String,

        /// Directory holding the output_<version> directories
        #[arg(long, default_value = ".")]
        base_dir: PathBuf,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    if let Commands::Version = cli.command {
        println!("pfcalib {}", pfc_core::VERSION);
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => config::read_config(path)?,
        None => config::CalibConfig::default(),
    };
    if let Some(dir) = cli.input_dir {
        config.input_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if config.threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(config.threads).build_global();
    }
    let ctx = RunContext::new(config, !cli.no_cache);

    match cli.command {
        Commands::Inputs => inputs::cmd_inputs(&ctx),
        Commands::Train { ntuple, only } => {
            train::cmd_train(&ctx, ntuple.as_deref(), only.as_deref())
        }
        Commands::Eval => eval::cmd_eval(&ctx),
        Commands::Results => results::cmd_results(&ctx),
        Commands::Slices => slices::cmd_slices(&ctx),
        Commands::MvaPars => mva_pars::cmd_mva_pars(&ctx),
        Commands::Overtraining => overtraining::cmd_overtraining(&ctx),
        Commands::Pfsize => pfsize::cmd_pfsize(&ctx),
        Commands::FitParams { pf_size } => fit_params::cmd_fit_params(&ctx, pf_size),
        Commands::Compare { first, second, base_dir } => {
            compare::cmd_compare(&ctx, &first, &second, &base_dir)
        }
        Commands::Version => Ok(()),
    }
}
