#![warn(missing_docs)]
//! Progress Tracker CLI Library
//!
//! Command line harness for benchmark binaries. Hand your [`Benchmark`] to
//! [`run`] from `main`; the same binary is re-executed as the worker process
//! for every isolated sample.
//!
//! # Example
//!
//! ```ignore
//! use progress_tracker::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let benchmark = Benchmark::new(estimate)
//!         .code(include_str!("pi.rs"))
//!         .target(Target::new("pi-1000", "Pi (1000 points)").param("points", 1000));
//!     progress_cli::run(benchmark)
//! }
//! ```

mod config;
mod executor;
mod formatting;
mod machine;
mod supervisor;
mod tracker;

pub use config::{
    ConfigError, IsolationMode, MachineConfig, OutputConfig, ProgressConfig, RunnerConfig,
    Settings, CONFIG_FILE, DEFAULT_OUTPUT, DEFAULT_SAMPLES,
};
pub use executor::{InProcessExecutor, IsolatedExecutor, SampleExecutor};
pub use machine::{build_profile, machine_id, MachineOverrides, MachineProbe, SystemProbe};
pub use supervisor::{SupervisorError, WorkerHandle, WorkerReply};
pub use tracker::{TargetOutcome, Tracker};

use anyhow::Context;
use clap::{Parser, Subcommand};
use progress_core::{Benchmark, Target, WorkerMain};
use progress_report::{ReportError, ReportStore};
use regex::Regex;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Progress tracker CLI arguments
#[derive(Parser, Debug)]
#[command(name = "progress")]
#[command(author, version, about = "Track benchmark results across runs")]
pub struct Cli {
    /// Optional subcommand; defaults to running the targets
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Only run targets whose id matches this regex (default: all)
    pub filter: Option<String>,

    /// Samples per target
    #[arg(long, short = 'n', env = "PROGRESS_SAMPLES")]
    pub samples: Option<u32>,

    /// Report file
    #[arg(long, short = 'o', env = "PROGRESS_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Indent the report JSON by this many spaces (compact when unset)
    #[arg(long, env = "PROGRESS_OUTPUT_INDENT")]
    pub output_indent: Option<usize>,

    /// Machine display name (default: host name)
    #[arg(long, env = "PROGRESS_MACHINE_NAME")]
    pub machine_name: Option<String>,

    /// Machine OS description (default: probed)
    #[arg(long, env = "PROGRESS_MACHINE_OS")]
    pub machine_os: Option<String>,

    /// vCPU count to list in the machine specs
    #[arg(long, env = "PROGRESS_MACHINE_VCPU")]
    pub machine_vcpu: Option<String>,

    /// Run each sample in a fresh worker process (default: true)
    /// Use --isolated=false to run samples in-process
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub isolated: Option<bool>,

    /// Kill a worker that takes longer than this per sample (e.g. "60s")
    #[arg(long)]
    pub worker_timeout: Option<String>,

    /// Configuration file (default: progress.toml found by walking up)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Dry run - list targets without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Internal: Run as worker process (used by supervisor)
    #[arg(long, hide = true)]
    pub progress_worker: bool,

    /// Internal: Absorb cargo bench's --bench flag
    #[arg(long, hide = true)]
    pub bench: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the targets that would run, with their sample counts
    List,
    /// Print a commented progress.toml template
    Config,
}

/// Parse the command line and run `benchmark`.
/// This is the main entry point for benchmark binaries.
pub fn run(benchmark: Benchmark) -> anyhow::Result<()> {
    run_with_cli(Cli::parse(), benchmark)
}

/// Run `benchmark` with pre-parsed arguments.
///
/// In worker mode this never returns: the process exits with 0 when every
/// sample completed and 1 otherwise.
pub fn run_with_cli(cli: Cli, benchmark: Benchmark) -> anyhow::Result<()> {
    // Worker mode first, before any other initialization
    if cli.progress_worker {
        let exit = WorkerMain::new(benchmark.bench_fn())
            .run()
            .context("worker channel failed")?;
        std::process::exit(exit.code());
    }

    init_tracing(cli.verbose);

    if let Some(Commands::Config) = cli.command {
        print!("{}", Settings::default_toml());
        return Ok(());
    }

    benchmark.validate()?;

    let file = match &cli.config {
        Some(path) => ProgressConfig::load(path)?,
        None => match ProgressConfig::discover()? {
            Some((path, config)) => {
                tracing::debug!(path = %path.display(), "using configuration file");
                config
            }
            None => ProgressConfig::default(),
        },
    };
    let settings = Settings::resolve(&file, &cli)?;
    let targets = select_targets(&benchmark, &settings.filter)?;

    if cli.dry_run || matches!(cli.command, Some(Commands::List)) {
        let entries: Vec<(String, String, u32)> = targets
            .iter()
            .map(|t| {
                let samples = settings.samples_for(t.samples, benchmark.sample_override());
                (t.id.clone(), t.name.clone(), samples)
            })
            .collect();
        println!("{}", formatting::plan(&entries));
        return Ok(());
    }

    if targets.is_empty() {
        println!("No targets match {:?}.", settings.filter);
        return Ok(());
    }

    let outcomes = run_targets(&benchmark, &settings, &targets)?;
    let working = outcomes.iter().filter(|o| o.is_working()).count();
    tracing::info!(
        working,
        total = outcomes.len(),
        output = %settings.output.display(),
        "run complete"
    );
    Ok(())
}

/// Targets of `benchmark` whose id matches `filter`, in declaration order
pub fn select_targets(benchmark: &Benchmark, filter: &str) -> Result<Vec<Target>, ConfigError> {
    let filter = Regex::new(filter)?;
    Ok(benchmark
        .target_list()
        .iter()
        .filter(|t| filter.is_match(&t.id))
        .cloned()
        .collect())
}

/// Build the tracker for `settings` and run `targets`
pub fn run_targets(
    benchmark: &Benchmark,
    settings: &Settings,
    targets: &[Target],
) -> anyhow::Result<Vec<TargetOutcome>> {
    let store = ReportStore::new(&settings.output, settings.output_indent);
    let machine = build_profile(&SystemProbe::new(), &settings.machine);
    tracing::debug!(machine = %machine.id, isolation = ?settings.isolation, "starting run");

    let outcomes = match settings.isolation {
        IsolationMode::Process => {
            let executor = IsolatedExecutor::current(settings.worker_timeout)
                .context("cannot locate the benchmark binary for worker processes")?;
            track(store, machine, executor, benchmark, settings, targets)?
        }
        IsolationMode::InProcess => {
            if settings.worker_timeout.is_some() {
                tracing::warn!("worker timeout has no effect without process isolation");
            }
            let executor = InProcessExecutor::new(benchmark.bench_fn());
            track(store, machine, executor, benchmark, settings, targets)?
        }
    };
    Ok(outcomes)
}

fn track<E: SampleExecutor>(
    store: ReportStore,
    machine: progress_report::MachineProfile,
    executor: E,
    benchmark: &Benchmark,
    settings: &Settings,
    targets: &[Target],
) -> Result<Vec<TargetOutcome>, ReportError> {
    let mut tracker = Tracker::new(store, machine, executor, benchmark.source(), settings.samples)?
        .with_suite_samples(benchmark.sample_override());
    tracker.run(targets)
}

/// Install the stderr log subscriber; `RUST_LOG` wins over the defaults
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "progress=debug"
    } else {
        "progress=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed by the host program or an earlier call
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
