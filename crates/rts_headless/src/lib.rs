//! Headless runner for production scenarios.
//!
//! This crate drives `rts_production` sessions without graphics:
//!
//! - **CI verification**: Scripted scenarios with a JSON-lines event stream
//! - **Seed sweeps**: Parallel batches summarizing launches, completions and upgrades
//! - **Determinism checks**: Repeated runs plus a snapshot resume must agree
//!
//! # Output
//!
//! Output uses JSON lines (one JSON object per line) on stdout; logs go to
//! stderr. See the [`protocol`] module for the line format.
//!
//! # Example
//!
//! ```bash
//! cargo run -p rts_headless -- run --scenario skirmish_1v1 --seed 7
//! cargo run -p rts_headless -- verify --scenario scenarios/siege.ron
//! ```

pub mod batch;
pub mod protocol;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, BatchConfig, BatchResults, BatchSummary};
pub use protocol::{CommandOutcome, OutputLine, RunReport};
pub use runner::{run_scenario, verify_determinism, ScenarioRunner, VerifyReport};
pub use scenario::{Scenario, ScenarioCommand, ScenarioError};
