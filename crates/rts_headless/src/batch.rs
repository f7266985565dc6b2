//! Batch runner for seed sweeps.
//!
//! Runs one scenario across many seeds in parallel using rayon and
//! aggregates the production reports.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::protocol::RunReport;
use crate::runner::run_scenario;
use crate::scenario::Scenario;

/// Configuration for a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario name or path, for the record
    pub scenario: String,
    /// Number of runs
    pub run_count: u32,
    /// Maximum parallel runs (0 = use rayon default)
    pub parallel_runs: u32,
    /// Output directory for results
    pub output_dir: PathBuf,
    /// Seed of the first run; run `i` uses `seed_start + i`
    pub seed_start: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "skirmish_1v1".to_string(),
            run_count: 100,
            parallel_runs: 0,
            output_dir: PathBuf::from("results"),
            seed_start: 0,
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario
    pub fn new(scenario: &str, run_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            run_count,
            ..Default::default()
        }
    }

    /// Set output directory
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }
}

/// Aggregate statistics over a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Runs that finished.
    pub total_runs: u32,
    /// Mean tasks launched per run.
    pub mean_launched: f64,
    /// Mean tasks completed per run.
    pub mean_completed: f64,
    /// Mean units spawned per run.
    pub mean_units_spawned: f64,
    /// Runs in which each `faction:upgrade` was applied.
    pub upgrade_counts: BTreeMap<String, u32>,
    /// Distinct final states across the batch.
    pub distinct_states: usize,
}

impl BatchSummary {
    /// Summarize run reports.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_runs(runs: &[RunReport]) -> Self {
        if runs.is_empty() {
            return Self::default();
        }
        let count = runs.len() as f64;
        let mean = |value: fn(&RunReport) -> f64| runs.iter().map(value).sum::<f64>() / count;

        let mut upgrade_counts = BTreeMap::new();
        for run in runs {
            let applied: BTreeSet<&String> = run.upgrades.iter().collect();
            for upgrade in applied {
                *upgrade_counts.entry(upgrade.clone()).or_insert(0) += 1;
            }
        }

        Self {
            total_runs: u32::try_from(runs.len()).unwrap_or(u32::MAX),
            mean_launched: mean(|run| f64::from(run.launched)),
            mean_completed: mean(|run| f64::from(run.completed)),
            mean_units_spawned: mean(|run| run.units_spawned as f64),
            upgrade_counts,
            distinct_states: runs
                .iter()
                .map(|run| run.state_hash)
                .collect::<BTreeSet<_>>()
                .len(),
        }
    }
}

/// Results from a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual run reports, in seed order
    pub runs: Vec<RunReport>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Error during batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Run index
    pub run_index: u32,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Run `scenario` once per seed in parallel.
pub fn run_batch(scenario: &Scenario, config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    info!(
        "Starting batch: {} runs of '{}' from seed {}",
        config.run_count, scenario.name, config.seed_start
    );

    // Configure thread pool if specified
    if config.parallel_runs > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_runs as usize)
            .build_global()
            .ok(); // Ignore if already set
    }

    let results: Vec<Result<RunReport, BatchError>> = (0..config.run_count)
        .into_par_iter()
        .map(|i| {
            let seed = config.seed_start.wrapping_add(u64::from(i));
            run_scenario(scenario, seed).map_err(|e| {
                warn!("Run {} (seed {}) failed: {}", i, seed, e);
                BatchError {
                    run_index: i,
                    seed,
                    message: e.to_string(),
                }
            })
        })
        .collect();

    let (runs, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let runs: Vec<RunReport> = runs.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_runs(&runs);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} runs in {:.2}s, {} distinct final states",
        runs.len(),
        duration_seconds,
        summary.distinct_states
    );

    BatchResults {
        config,
        runs,
        summary,
        duration_seconds,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new("custom_scenario", 500)
            .with_output(PathBuf::from("/tmp/results"))
            .with_seed(12345);

        assert_eq!(config.scenario, "custom_scenario");
        assert_eq!(config.run_count, 500);
        assert_eq!(config.seed_start, 12345);
    }

    #[test]
    fn test_run_batch_small() {
        let scenario = Scenario::skirmish_1v1().unwrap();
        let results = run_batch(&scenario, BatchConfig::new("skirmish_1v1", 6).with_seed(10));

        assert_eq!(results.runs.len(), 6);
        assert!(results.errors.is_empty());
        let seeds: Vec<u64> = results.runs.iter().map(|run| run.seed).collect();
        assert_eq!(seeds, (10..16).collect::<Vec<_>>());
        assert_eq!(results.summary.total_runs, 6);
        assert_eq!(results.summary.upgrade_counts.get("1:pikes"), Some(&6));
    }

    #[test]
    fn test_summary_of_nothing() {
        assert_eq!(BatchSummary::from_runs(&[]), BatchSummary::default());
    }

    #[test]
    fn test_batch_results_save_load() {
        let scenario = Scenario::skirmish_1v1().unwrap();
        let results = run_batch(&scenario, BatchConfig::new("skirmish_1v1", 2));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        results.save(&path).unwrap();
        assert!(path.exists());

        let loaded = BatchResults::load(&path).unwrap();
        assert_eq!(loaded.runs, results.runs);
        assert_eq!(loaded.config.scenario, "skirmish_1v1");
    }
}
