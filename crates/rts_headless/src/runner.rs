//! Scenario runner: drives a production session through a scenario's
//! command schedule and reports what happened.

use std::collections::BTreeMap;
use std::io::Write;

use tracing::{debug, info, warn};

use rts_production::economy::ResourceLedger;
use rts_production::factions::FactionId;
use rts_production::launcher::{LauncherId, TaskLauncher};
use rts_production::session::Session;
use rts_production::snapshot::SessionSnapshot;
use rts_production::upgrades::UpgradeId;
use rts_production::world::EntityId;

use crate::protocol::{CommandOutcome, OutputLine, RunReport};
use crate::scenario::{Scenario, ScenarioCommand, ScenarioError};

/// Runs one scenario with one seed.
pub struct ScenarioRunner<'a> {
    scenario: &'a Scenario,
    session: Session,
    report: RunReport,
}

impl<'a> ScenarioRunner<'a> {
    /// Build the session for `scenario` seeded with `seed`.
    pub fn new(scenario: &'a Scenario, seed: u64) -> Result<Self, ScenarioError> {
        let mut session = scenario.build_session(seed)?;
        // Registration events belong to setup, not to tick 0.
        session.take_events();
        Ok(Self {
            scenario,
            session,
            report: RunReport {
                scenario: scenario.name.clone(),
                seed,
                ..RunReport::default()
            },
        })
    }

    /// The session being driven.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access for harnesses that swap state mid-run.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Whether every scheduled tick has been simulated.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.session.current_tick() >= self.scenario.ticks
    }

    /// Issue this tick's commands, simulate the tick and return the output.
    pub fn step(&mut self) -> Vec<OutputLine> {
        let tick = self.session.current_tick();
        let mut lines = Vec::new();

        for command in self.scenario.commands_at(tick) {
            let outcome = self.apply(command);
            if matches!(outcome, CommandOutcome::Error { .. }) {
                self.report.command_errors += 1;
            }
            lines.push(OutputLine::Command {
                tick,
                command: command.clone(),
                outcome,
            });
        }

        for event in self.session.tick() {
            self.report.record(&event);
            lines.push(OutputLine::Event { tick, event });
        }
        lines
    }

    /// Run to the end, writing every line as JSON to `out`.
    pub fn run_to<W: Write>(mut self, out: &mut W) -> Result<RunReport, ScenarioError> {
        OutputLine::ready(&self.scenario.name, self.report.seed).write_to(out)?;
        while !self.finished() {
            for line in self.step() {
                line.write_to(out)?;
            }
        }
        let report = self.finish()?;
        OutputLine::Summary(report.clone()).write_to(out)?;
        Ok(report)
    }

    /// Run to the end without producing output.
    pub fn run(mut self) -> Result<RunReport, ScenarioError> {
        while !self.finished() {
            self.step();
        }
        self.finish()
    }

    /// Final report for the ticks simulated so far.
    pub fn finish(mut self) -> Result<RunReport, ScenarioError> {
        let host = self.session.host();
        self.report.ticks = self.session.current_tick();
        self.report.state_hash = self.session.state_hash()?;
        self.report.units_spawned = host.world.spawned.len();
        self.report.creation_intents = host.world.intents.len();
        self.report.resources = self
            .scenario
            .factions
            .iter()
            .map(|setup| {
                let balances: BTreeMap<String, i32> = setup
                    .resources
                    .keys()
                    .map(|resource| {
                        let balance = host.stockpile.balance(setup.faction(), &resource.as_str().into());
                        (resource.clone(), balance)
                    })
                    .collect();
                (setup.id.to_string(), balances)
            })
            .collect();

        info!(
            scenario = %self.report.scenario,
            seed = self.report.seed,
            ticks = self.report.ticks,
            hash = self.report.state_hash,
            "Scenario run finished"
        );
        Ok(self.report)
    }

    fn launcher_for(&self, entity: EntityId) -> Result<LauncherId, ScenarioError> {
        self.session
            .launchers()
            .find(|launcher| launcher.holder().entity() == entity)
            .map(TaskLauncher::id)
            .ok_or(ScenarioError::UnknownEntity(entity))
    }

    /// Issue one command against the session.
    pub fn apply(&mut self, command: &ScenarioCommand) -> CommandOutcome {
        debug!(?command, tick = self.session.current_tick(), "Issuing command");
        match self.try_apply(command) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(?command, "Command failed: {}", err);
                CommandOutcome::Error {
                    message: err.to_string(),
                }
            }
        }
    }

    fn try_apply(&mut self, command: &ScenarioCommand) -> Result<CommandOutcome, ScenarioError> {
        let outcome = match command {
            ScenarioCommand::Launch { entity, task } => {
                let id = self.launcher_for(*entity)?;
                let result = self.session.launch(id, *task)?;
                CommandOutcome::Admission {
                    result,
                    message: result.message().to_owned(),
                }
            }
            ScenarioCommand::Cancel {
                entity,
                queue_index,
            } => {
                let id = self.launcher_for(*entity)?;
                CommandOutcome::Canceled {
                    canceled: self.session.cancel(id, *queue_index)?,
                }
            }
            ScenarioCommand::SetHealth { entity, health } => {
                let id = self.launcher_for(*entity)?;
                self.session.set_health(id, *health)?;
                CommandOutcome::Done
            }
            ScenarioCommand::RequestLaunch {
                faction,
                kind,
                entity,
                task,
            } => {
                let id = self.launcher_for(*entity)?;
                let accepted =
                    self.session
                        .request_auto_launch(FactionId(*faction), *kind, id, *task)?;
                CommandOutcome::Requested { accepted }
            }
            ScenarioCommand::ApplyUpgrade { faction, upgrade } => {
                self.session
                    .apply_upgrade(&UpgradeId::new(upgrade.as_str()), FactionId(*faction))?;
                CommandOutcome::Done
            }
            ScenarioCommand::SetTaskEnabled {
                faction,
                task,
                enabled,
            } => {
                self.session
                    .set_task_enabled(&task.as_str().into(), FactionId(*faction), *enabled);
                CommandOutcome::Done
            }
            ScenarioCommand::SetResource {
                faction,
                resource,
                amount,
            } => {
                self.session
                    .host_mut()
                    .stockpile
                    .set(FactionId(*faction), resource.as_str(), *amount);
                CommandOutcome::Done
            }
        };
        Ok(outcome)
    }
}

/// Run a scenario silently and return its report.
pub fn run_scenario(scenario: &Scenario, seed: u64) -> Result<RunReport, ScenarioError> {
    ScenarioRunner::new(scenario, seed)?.run()
}

/// Result of a determinism check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// Final hash of each full run.
    pub hashes: Vec<u64>,
    /// Final hash of the run resumed from a mid-run snapshot.
    pub resumed_hash: u64,
}

impl VerifyReport {
    /// Whether every run, including the resumed one, ended in the same state.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes
            .first()
            .is_some_and(|first| self.hashes.iter().all(|h| h == first) && self.resumed_hash == *first)
    }
}

/// Run a scenario `runs` times with one seed, then once more resumed from
/// a snapshot taken halfway through.
pub fn verify_determinism(scenario: &Scenario, seed: u64, runs: u32) -> Result<VerifyReport, ScenarioError> {
    let hashes = (0..runs.max(1))
        .map(|_| run_scenario(scenario, seed).map(|report| report.state_hash))
        .collect::<Result<Vec<_>, _>>()?;

    let mut original = ScenarioRunner::new(scenario, seed)?;
    while original.session().current_tick() < scenario.ticks / 2 {
        original.step();
    }
    let bytes = original.session().snapshot().to_bytes()?;

    let mut resumed = ScenarioRunner::new(scenario, seed)?;
    resumed
        .session_mut()
        .restore(SessionSnapshot::from_bytes(&bytes)?)?;
    // Ledgers live in the host, outside the snapshot.
    *resumed.session_mut().host_mut() = original.session().host().clone();
    let resumed_hash = resumed.run()?.state_hash;

    let report = VerifyReport {
        hashes,
        resumed_hash,
    };
    if !report.is_deterministic() {
        warn!(seed, ?report, "Scenario diverged");
    }
    Ok(report)
}
