//! JSON lines written by the headless runner.
//!
//! Every line on stdout is one JSON object tagged by `type`:
//!
//! ```text
//! {"type":"ready","scenario":"Standard 1v1 Skirmish","seed":7,"version":"1.0"}
//! {"type":"command","tick":0,"command":{"Launch":{"entity":10,"task":0}},"outcome":{"admission":{"result":"Success","message":""}}}
//! {"type":"event","tick":0,"event":{"TaskLaunched":{"launcher":1,"task":0,"code":"train_spearman","queue_pos":0}}}
//! {"type":"summary","scenario":"Standard 1v1 Skirmish","seed":7,...}
//! ```
//!
//! Logs go to stderr so stdout stays machine-readable.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use rts_production::admission::AdmissionResult;
use rts_production::events::ProductionEvent;

use crate::scenario::ScenarioCommand;

/// Output format version.
pub const PROTOCOL_VERSION: &str = "1.0";

/// What a scheduled command did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// A launch went through admission.
    Admission {
        /// Admission verdict.
        result: AdmissionResult,
        /// Player-facing text for the verdict.
        message: String,
    },
    /// A cancel request; `false` means the index was out of range.
    Canceled {
        /// Whether an entry was removed.
        canceled: bool,
    },
    /// A production manager request.
    Requested {
        /// Whether the manager launched the task.
        accepted: bool,
    },
    /// The command has no return value.
    Done,
    /// The command failed.
    Error {
        /// Error text.
        message: String,
    },
}

/// Aggregate results of one scenario run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Scenario name.
    pub scenario: String,
    /// Session seed.
    pub seed: u64,
    /// Ticks simulated.
    pub ticks: u64,
    /// Hash of the final session snapshot.
    pub state_hash: u64,
    /// Tasks that entered a queue.
    pub launched: u32,
    /// Tasks that reached completion.
    pub completed: u32,
    /// Pending tasks canceled with a refund.
    pub canceled: u32,
    /// Upgrades applied, in order, as `faction:upgrade`.
    pub upgrades: Vec<String>,
    /// Units spawned directly by the session.
    pub units_spawned: usize,
    /// Creation intents sent in replicated mode.
    pub creation_intents: usize,
    /// Commands that failed.
    pub command_errors: u32,
    /// Final balances of the scenario's resources, keyed by faction id.
    pub resources: BTreeMap<String, BTreeMap<String, i32>>,
}

impl RunReport {
    /// Count one event.
    pub fn record(&mut self, event: &ProductionEvent) {
        match event {
            ProductionEvent::TaskLaunched { .. } => self.launched += 1,
            ProductionEvent::TaskCompleted { .. } => self.completed += 1,
            ProductionEvent::TaskCanceled { .. } => self.canceled += 1,
            ProductionEvent::UnitUpgraded {
                upgrade, faction, ..
            }
            | ProductionEvent::BuildingUpgraded {
                upgrade, faction, ..
            } => self.upgrades.push(format!("{}:{upgrade}", faction.0)),
            ProductionEvent::LauncherAdded { .. } | ProductionEvent::LauncherRemoved { .. } => {}
        }
    }
}

/// One line of runner output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputLine {
    /// Written once before the first tick.
    Ready {
        /// Scenario name.
        scenario: String,
        /// Session seed.
        seed: u64,
        /// Output format version.
        version: String,
    },
    /// A scheduled command and its outcome.
    Command {
        /// Tick the command was issued before.
        tick: u64,
        /// The command.
        command: ScenarioCommand,
        /// What it did.
        outcome: CommandOutcome,
    },
    /// A production event.
    Event {
        /// Tick during or before which the event was published.
        tick: u64,
        /// The event.
        event: ProductionEvent,
    },
    /// Written once after the last tick.
    Summary(RunReport),
}

impl OutputLine {
    /// Ready line for a run.
    #[must_use]
    pub fn ready(scenario: &str, seed: u64) -> Self {
        Self::Ready {
            scenario: scenario.to_owned(),
            seed,
            version: PROTOCOL_VERSION.to_owned(),
        }
    }

    /// Write as one JSON line.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        serde_json::to_writer(&mut *writer, self).map_err(io::Error::other)?;
        writer.write_all(b"\n")
    }
}
