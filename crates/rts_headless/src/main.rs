//! Headless production scenario runner.
//!
//! Runs production sessions without graphics and writes JSON lines on
//! stdout. Designed for CI checks, seed sweeps and determinism verification.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in skirmish and stream events
//! cargo run -p rts_headless -- run --scenario skirmish_1v1 --seed 7
//!
//! # Run a scenario file and keep the event stream
//! cargo run -p rts_headless -- run --scenario scenarios/siege.ron --output siege.jsonl
//!
//! # Seed sweep
//! cargo run -p rts_headless -- batch --scenario skirmish_1v1 --count 1000 --output results/
//!
//! # Verify determinism, including snapshot resume
//! cargo run -p rts_headless -- verify --scenario skirmish_1v1 --seed 12345 --runs 5
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to override the level.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rts_headless::{
    batch::{run_batch, BatchConfig},
    runner::{verify_determinism, ScenarioRunner},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "rts_headless")]
#[command(about = "Headless production scenario runner for CI and seed sweeps")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single scenario and stream JSON lines
    Run {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Session seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Write lines to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a scenario across many seeds
    Batch {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Number of runs
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel runs (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Verify determinism by running same seed multiple times
    Verify {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for output lines)
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            seed,
            output,
        } => cmd_run(&scenario, seed, output),
        Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
        } => cmd_batch(&scenario, count, parallel, output, seed),
        Commands::Verify {
            scenario,
            seed,
            runs,
        } => cmd_verify(&scenario, seed, runs),
    }
}

fn load_scenario(name_or_path: &str) -> Scenario {
    match Scenario::resolve(name_or_path) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("Failed to load scenario '{name_or_path}': {e}");
            std::process::exit(1);
        }
    }
}

/// Run a single scenario
fn cmd_run(scenario: &str, seed: u64, output: Option<PathBuf>) {
    let scenario = load_scenario(scenario);
    tracing::info!("Running '{}' with seed {}", scenario.name, seed);

    let mut out: Box<dyn Write> = match output {
        Some(path) => match File::create(&path) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(e) => {
                eprintln!("Failed to create {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let result = ScenarioRunner::new(&scenario, seed).and_then(|runner| runner.run_to(&mut out));
    if let Err(e) = out.flush() {
        eprintln!("Failed to flush output: {e}");
        std::process::exit(1);
    }
    match result {
        Ok(report) => {
            eprintln!(
                "Finished {} ticks: {} launched, {} completed, {} canceled, hash {:016x}",
                report.ticks, report.launched, report.completed, report.canceled, report.state_hash
            );
            if report.command_errors > 0 {
                eprintln!("{} commands failed", report.command_errors);
            }
        }
        Err(e) => {
            eprintln!("Run failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Run a seed sweep
fn cmd_batch(scenario_arg: &str, count: u32, parallel: u32, output: PathBuf, seed: u64) {
    let scenario = load_scenario(scenario_arg);
    let config = BatchConfig {
        parallel_runs: parallel,
        ..BatchConfig::new(scenario_arg, count)
            .with_output(output.clone())
            .with_seed(seed)
    };

    let results = run_batch(&scenario, config);
    let path = output.join("batch.json");
    if let Err(e) = results.save(&path) {
        eprintln!("Failed to save results: {e}");
        std::process::exit(1);
    }

    let summary = &results.summary;
    eprintln!("Results saved to {}", path.display());
    eprintln!(
        "{} runs, {} errors, {} distinct final states",
        summary.total_runs,
        results.errors.len(),
        summary.distinct_states
    );
    eprintln!(
        "Mean per run: {:.1} launched, {:.1} completed, {:.1} units",
        summary.mean_launched, summary.mean_completed, summary.mean_units_spawned
    );
    for (upgrade, runs) in &summary.upgrade_counts {
        eprintln!("  {upgrade}: {runs} runs");
    }
    if !results.errors.is_empty() {
        std::process::exit(1);
    }
}

/// Verify determinism
fn cmd_verify(scenario: &str, seed: u64, runs: u32) {
    let scenario = load_scenario(scenario);
    tracing::info!(
        "Verifying determinism: {} with seed {} ({} runs)",
        scenario.name,
        seed,
        runs
    );

    match verify_determinism(&scenario, seed, runs) {
        Ok(report) if report.is_deterministic() => {
            eprintln!(
                "PASS: All {} runs and the snapshot resume produced identical results",
                report.hashes.len()
            );
        }
        Ok(report) => {
            eprintln!("FAIL: Non-determinism detected!");
            eprintln!("  run hashes: {:016x?}", report.hashes);
            eprintln!("  resumed hash: {:016x}", report.resumed_hash);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Verification failed: {e}");
            std::process::exit(1);
        }
    }
}
