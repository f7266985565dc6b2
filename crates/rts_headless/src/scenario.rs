//! Scenario loading and session setup.
//!
//! Scenarios describe a production session for headless runs: the ruleset,
//! the factions with their ledgers and strategies, the starting buildings
//! and a schedule of player commands.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rts_production::ai::{StrategyBook, StrategyRole};
use rts_production::config::SessionConfig;
use rts_production::data::ProductionData;
use rts_production::economy::Stockpile;
use rts_production::error::ProductionError;
use rts_production::factions::{Controller, FactionId, FactionProfile};
use rts_production::host::SandboxHost;
use rts_production::math::Vec2Fixed;
use rts_production::population::PopulationCounter;
use rts_production::session::Session;
use rts_production::tasks::{TaskKind, TypeCode};
use rts_production::world::{EntityId, Holder};

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read a scenario or write output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The session rejected part of the scenario.
    #[error("Scenario setup failed: {0}")]
    Production(#[from] ProductionError),
    /// A command names an entity that holds no launcher.
    #[error("No launcher is held by entity {0}")]
    UnknownEntity(EntityId),
}

/// Starting setup for one faction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionSetup {
    /// Faction identifier.
    pub id: u32,
    /// Who issues the faction's commands.
    #[serde(default)]
    pub controller: Controller,
    /// Faction type code for faction-specific tasks.
    #[serde(default)]
    pub type_code: Option<String>,
    /// Starting resource balances.
    #[serde(default)]
    pub resources: BTreeMap<String, i32>,
    /// Population capacity.
    #[serde(default)]
    pub population_cap: u32,
    /// Per-type population limits.
    #[serde(default)]
    pub type_limits: BTreeMap<String, u32>,
    /// Entity types with an active production strategy.
    #[serde(default)]
    pub strategies: Vec<String>,
    /// Strategy role assignments.
    #[serde(default)]
    pub roles: BTreeMap<StrategyRole, String>,
    /// Building types offered by the placement UI.
    #[serde(default)]
    pub placement: Vec<String>,
}

impl FactionSetup {
    /// Faction id as used by the session.
    #[must_use]
    pub const fn faction(&self) -> FactionId {
        FactionId(self.id)
    }

    fn profile(&self) -> FactionProfile {
        let profile = FactionProfile::new(self.faction(), self.controller);
        match &self.type_code {
            Some(code) => profile.with_type_code(code.as_str()),
            None => profile,
        }
    }

    fn strategy_book(&self) -> Option<StrategyBook> {
        if self.strategies.is_empty() && self.roles.is_empty() {
            return None;
        }
        let book = self
            .strategies
            .iter()
            .fold(StrategyBook::new(), |book, code| book.with_strategy(code.as_str()));
        Some(
            self.roles
                .iter()
                .fold(book, |book, (role, code)| book.with_role(*role, code.as_str())),
        )
    }
}

/// A building present when the scenario starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingSetup {
    /// Host entity id.
    pub entity: EntityId,
    /// Owning faction.
    pub faction: u32,
    /// Building type; must have a launcher template.
    pub code: String,
    /// Starting health.
    #[serde(default = "default_health")]
    pub health: i32,
    /// Grid position.
    #[serde(default)]
    pub position: (i32, i32),
}

const fn default_health() -> i32 {
    100
}

/// A player or AI command issued against the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioCommand {
    /// Launch a catalog task on the launcher held by `entity`.
    Launch {
        /// Holder entity.
        entity: EntityId,
        /// Catalog index.
        task: usize,
    },
    /// Cancel a pending queue entry.
    Cancel {
        /// Holder entity.
        entity: EntityId,
        /// Queue position.
        queue_index: usize,
    },
    /// Change a holder's health.
    SetHealth {
        /// Holder entity.
        entity: EntityId,
        /// New health.
        health: i32,
    },
    /// Ask a faction's production manager to launch a task.
    RequestLaunch {
        /// Requesting faction.
        faction: u32,
        /// Manager kind.
        kind: TaskKind,
        /// Holder entity.
        entity: EntityId,
        /// Catalog index.
        task: usize,
    },
    /// Apply an upgrade directly, as a scripted event would.
    ApplyUpgrade {
        /// Upgraded faction.
        faction: u32,
        /// Upgrade id.
        upgrade: String,
    },
    /// Enable or disable a task code for a faction.
    SetTaskEnabled {
        /// Faction.
        faction: u32,
        /// Task code.
        task: String,
        /// New state.
        enabled: bool,
    },
    /// Overwrite a resource balance.
    SetResource {
        /// Faction.
        faction: u32,
        /// Resource name.
        resource: String,
        /// New balance.
        amount: i32,
    },
}

/// A command scheduled before a given tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledCommand {
    /// Issued before this tick is simulated.
    pub tick: u64,
    /// The command.
    pub command: ScenarioCommand,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Session settings; the seed is overridden by the caller.
    #[serde(default)]
    pub config: SessionConfig,
    /// Launcher templates and upgrades.
    #[serde(default)]
    pub data: ProductionData,
    /// Participating factions.
    pub factions: Vec<FactionSetup>,
    /// Starting buildings.
    #[serde(default)]
    pub buildings: Vec<BuildingSetup>,
    /// Command schedule.
    #[serde(default)]
    pub commands: Vec<ScheduledCommand>,
    /// Ticks to simulate.
    #[serde(default = "default_ticks")]
    pub ticks: u64,
}

const fn default_ticks() -> u64 {
    600
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        let problems = scenario.data.validate();
        if !problems.is_empty() {
            return Err(ProductionError::DataParseError(problems.join("; ")).into());
        }
        Ok(scenario)
    }

    /// Build the sandbox host holding every faction's ledgers and strategies.
    #[must_use]
    pub fn host(&self) -> SandboxHost {
        let mut stockpile = Stockpile::new();
        let mut population = PopulationCounter::new();
        let mut host = SandboxHost::new();
        for setup in &self.factions {
            let faction = setup.faction();
            for (resource, &amount) in &setup.resources {
                stockpile.set(faction, resource.as_str(), amount);
            }
            population.set_max(faction, setup.population_cap);
            for (code, &limit) in &setup.type_limits {
                population.set_type_limit(faction, code.as_str(), limit);
            }
            if let Some(book) = setup.strategy_book() {
                host.strategies.insert(faction, book);
            }
        }
        host.with_stockpile(stockpile).with_population(population)
    }

    /// Build a session seeded with `seed` and populated from the scenario.
    pub fn build_session(&self, seed: u64) -> Result<Session, ScenarioError> {
        let mut config = self.config;
        config.seed = seed;
        let mut session = Session::new(config, self.host());
        session.load_data(&self.data);

        for setup in &self.factions {
            session.add_faction(setup.profile())?;
            if !setup.placement.is_empty() {
                let codes = setup.placement.iter().map(TypeCode::new).collect();
                session.set_placement(setup.faction(), codes);
            }
        }
        for building in &self.buildings {
            let (x, y) = building.position;
            let holder = Holder::building(
                building.entity,
                building.code.as_str(),
                building.health,
                Vec2Fixed::from_ints(x, y),
            );
            session.spawn_launcher(FactionId(building.faction), holder)?;
        }
        Ok(session)
    }

    /// Commands scheduled before `tick`, in file order.
    pub fn commands_at(&self, tick: u64) -> impl Iterator<Item = &ScenarioCommand> {
        self.commands
            .iter()
            .filter(move |scheduled| scheduled.tick == tick)
            .map(|scheduled| &scheduled.command)
    }

    /// Built-in skirmish: a local player against an autonomous faction.
    pub fn skirmish_1v1() -> Result<Self, ScenarioError> {
        Self::from_ron_str(SKIRMISH_1V1)
    }

    /// Resolve a scenario argument: a built-in name or a RON file path.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match name_or_path {
            "skirmish_1v1" => Self::skirmish_1v1(),
            path => Self::load(path),
        }
    }
}

const SKIRMISH_1V1: &str = r#"
Scenario(
    name: "Standard 1v1 Skirmish",
    description: "Local barracks against an autonomous faction that researches pikes",
    config: SessionConfig(
        tick_duration: 0.5,
        auto_production: AutoProductionConfig(
            reload_range: FixedRange(min: 5.0, max: 10.0),
            acceptance_range: FixedRange(min: 0.5, max: 0.8),
        ),
    ),
    data: ProductionData(
        launchers: [
            LauncherTemplate(
                code: "barracks",
                tasks: [
                    TaskDefinition(
                        code: "train_spearman",
                        description: "Train spearman",
                        kind: CreateUnit,
                        reload_time: 5.0,
                        cost: [ResourceCost(resource: "wood", amount: 40)],
                        payload: CreateUnit(prefabs: [UnitPrefab(code: "spearman")]),
                    ),
                    TaskDefinition(
                        code: "research_pikes",
                        kind: UnitUpgrade,
                        reload_time: 10.0,
                        use_once: true,
                        use_once_on_all_instances: true,
                        cost: [ResourceCost(resource: "wood", amount: 60)],
                        payload: Upgrade("pikes"),
                    ),
                    TaskDefinition(
                        code: "fortify",
                        kind: BuildingUpgrade,
                        reload_time: 20.0,
                        use_once: true,
                        use_once_on_all_instances: true,
                        cost: [ResourceCost(resource: "stone", amount: 100)],
                        payload: Upgrade("fortify"),
                    ),
                ],
            ),
            LauncherTemplate(
                code: "fortress",
                min_task_health: 100,
                max_tasks: 6,
                tasks: [
                    TaskDefinition(
                        code: "train_spearman",
                        description: "Train spearman",
                        kind: CreateUnit,
                        reload_time: 4.0,
                        cost: [ResourceCost(resource: "wood", amount: 40)],
                        payload: CreateUnit(prefabs: [UnitPrefab(code: "spearman")]),
                    ),
                ],
            ),
        ],
        upgrades: [
            Unit(UnitUpgrade(
                id: "pikes",
                source: "spearman",
                target: "pikeman",
                replacement: UnitReplacement(
                    description: "Train pikeman",
                    reload_time: 6.0,
                    cost: [ResourceCost(resource: "wood", amount: 50)],
                ),
            )),
            Building(BuildingUpgrade(
                id: "fortify",
                source: "barracks",
                target: "fortress",
                effect: Some("dust"),
            )),
        ],
    ),
    factions: [
        FactionSetup(
            id: 1,
            controller: LocalPlayer,
            resources: {"wood": 400, "stone": 200},
            population_cap: 20,
            placement: ["house", "barracks"],
        ),
        FactionSetup(
            id: 2,
            controller: Autonomous,
            resources: {"wood": 400, "stone": 200},
            population_cap: 20,
            type_limits: {"spearman": 8},
            strategies: ["pikeman", "fortress"],
            roles: {Army: "spearman", CenterBuilding: "barracks"},
            placement: ["house", "barracks"],
        ),
    ],
    buildings: [
        BuildingSetup(entity: 10, faction: 1, code: "barracks", health: 500, position: (4, 4)),
        BuildingSetup(entity: 11, faction: 1, code: "barracks", health: 500, position: (8, 4)),
        BuildingSetup(entity: 20, faction: 2, code: "barracks", health: 500, position: (60, 60)),
    ],
    commands: [
        ScheduledCommand(tick: 0, command: Launch(entity: 10, task: 0)),
        ScheduledCommand(tick: 0, command: Launch(entity: 10, task: 0)),
        ScheduledCommand(tick: 4, command: Cancel(entity: 10, queue_index: 1)),
        ScheduledCommand(tick: 20, command: Launch(entity: 11, task: 1)),
        ScheduledCommand(tick: 60, command: Launch(entity: 11, task: 0)),
        ScheduledCommand(tick: 80, command: Launch(entity: 10, task: 2)),
    ],
    ticks: 400,
)
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rts_production::economy::ResourceLedger;

    #[test]
    fn test_builtin_skirmish_parses() {
        let scenario = Scenario::from_ron_str(SKIRMISH_1V1).unwrap();
        assert_eq!(scenario.factions.len(), 2);
        assert_eq!(scenario.buildings.len(), 3);
        assert_eq!(scenario.data.launchers.len(), 2);
        assert_eq!(scenario.commands_at(0).count(), 2);
    }

    #[test]
    fn test_build_session_registers_launchers() {
        let session = Scenario::skirmish_1v1().unwrap().build_session(7).unwrap();
        assert_eq!(session.launchers().count(), 3);
        assert_eq!(session.config().seed, 7);
        assert_eq!(session.managers().len(), 2);
        assert_eq!(
            session.host().stockpile.balance(FactionId(1), &"wood".into()),
            400
        );
    }

    #[test]
    fn test_resolve_rejects_missing_file() {
        assert!(matches!(
            Scenario::resolve("does/not/exist.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_ruleset_rejected() {
        let ron = r#"
            Scenario(
                name: "broken",
                data: ProductionData(
                    launchers: [
                        LauncherTemplate(code: "barracks", tasks: []),
                        LauncherTemplate(code: "barracks", tasks: []),
                    ],
                ),
                factions: [],
            )
        "#;
        assert!(matches!(
            Scenario::from_ron_str(ron),
            Err(ScenarioError::Production(ProductionError::DataParseError(_)))
        ));
    }
}
