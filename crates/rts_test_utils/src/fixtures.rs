//! Test fixtures and helpers.
//!
//! Pre-built sessions, catalogs and upgrade books for consistent testing.
//! Every fixture session ticks in whole seconds so timings are exact.

use fixed::types::I32F32;
use rts_production::ai::{StrategyBook, StrategyRole};
use rts_production::config::{AutoProductionConfig, SessionConfig};
use rts_production::economy::{ResourceCost, Stockpile};
use rts_production::factions::{Controller, FactionId, FactionProfile};
use rts_production::host::SandboxHost;
use rts_production::launcher::{LauncherId, LauncherTemplate, TaskLauncher};
use rts_production::math::Vec2Fixed;
use rts_production::population::PopulationCounter;
use rts_production::session::Session;
use rts_production::tasks::{TaskCatalog, TaskDefinition, TaskKind, UnitPrefab};
use rts_production::upgrades::{
    BuildingUpgrade, UnitReplacement, UnitUpgrade, UpgradeBook, UpgradeDefinition, UpgradeId,
};
use rts_production::world::{EntityId, Holder};

/// Local player faction in fixture sessions.
pub const RED: FactionId = FactionId(1);

/// Autonomous faction in [`skirmish_session`].
pub const BLUE: FactionId = FactionId(2);

/// Wood each fixture faction starts with.
pub const STARTING_WOOD: i32 = 100;

/// Population cap of each fixture faction.
pub const POPULATION_CAP: u32 = 20;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Position from integer coordinates.
#[must_use]
pub fn at(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// `train_spearman`: 40 wood, 5 seconds.
#[must_use]
pub fn spearman_task() -> TaskDefinition {
    TaskDefinition::create_unit("train_spearman", vec![UnitPrefab::new("spearman")], fixed(5))
        .with_description("Train spearman")
        .with_cost(vec![ResourceCost::new("wood", 40)])
}

/// Barracks catalog: spearmen, the faction-wide pike research and a cancel button.
///
/// Indices: 0 `train_spearman`, 1 `research_pikes`, 2 `cancel`.
#[must_use]
pub fn barracks_catalog() -> TaskCatalog {
    let catalog = TaskCatalog::new(vec![
        spearman_task(),
        TaskDefinition::unit_upgrade("research_pikes", UpgradeId::new("pikes"), fixed(10))
            .with_cost(vec![ResourceCost::new("wood", 20)])
            .with_use_once(true),
        TaskDefinition::new("cancel", TaskKind::CancelPending, fixed(0)),
    ]);
    catalog.expect("fixture catalog is valid")
}

/// Barracks template; also used for fortresses.
#[must_use]
pub fn barracks_template(code: &str) -> LauncherTemplate {
    LauncherTemplate {
        code: code.to_owned(),
        min_task_health: TaskLauncher::DEFAULT_MIN_TASK_HEALTH,
        max_tasks: TaskLauncher::DEFAULT_MAX_TASKS,
        tasks: barracks_catalog().iter().cloned().collect(),
    }
}

/// `pikes`: spearman becomes pikeman, 6 seconds for 50 wood.
#[must_use]
pub fn pikes_upgrade() -> UpgradeDefinition {
    UpgradeDefinition::Unit(UnitUpgrade {
        id: UpgradeId::new("pikes"),
        source: "spearman".into(),
        target: "pikeman".into(),
        replacement: UnitReplacement {
            description: "Train pikeman".to_owned(),
            icon: None,
            reload_time: fixed(6),
            cost: vec![ResourceCost::new("wood", 50)],
        },
        unit_triggers: Vec::new(),
        building_triggers: Vec::new(),
    })
}

/// `fortify`: barracks becomes fortress.
#[must_use]
pub fn fortify_upgrade() -> UpgradeDefinition {
    UpgradeDefinition::Building(BuildingUpgrade {
        id: UpgradeId::new("fortify"),
        source: "barracks".into(),
        target: "fortress".into(),
        effect: Some("dust".to_owned()),
        unit_triggers: Vec::new(),
        building_triggers: Vec::new(),
    })
}

/// Book with `pikes` and `fortify`.
#[must_use]
pub fn standard_book() -> UpgradeBook {
    UpgradeBook::new()
        .with(pikes_upgrade())
        .with(fortify_upgrade())
}

/// Host where each faction has [`STARTING_WOOD`] and [`POPULATION_CAP`].
#[must_use]
pub fn sandbox_host(factions: &[FactionId]) -> SandboxHost {
    let mut stockpile = Stockpile::new();
    let mut population = PopulationCounter::new();
    for &faction in factions {
        stockpile.set(faction, "wood", STARTING_WOOD);
        population.set_max(faction, POPULATION_CAP);
    }
    SandboxHost::new()
        .with_stockpile(stockpile)
        .with_population(population)
}

/// Session config ticking one second per tick.
#[must_use]
pub fn whole_second_config(seed: u64) -> SessionConfig {
    SessionConfig::seeded(seed).with_tick_duration(fixed(1))
}

/// Session with [`RED`] as the local player and the standard upgrade book.
#[must_use]
pub fn local_session(seed: u64) -> Session {
    let mut session =
        Session::new(whole_second_config(seed), sandbox_host(&[RED])).with_upgrades(standard_book());
    session.add_template(barracks_template("barracks"));
    session.add_template(barracks_template("fortress"));
    session
        .add_faction(FactionProfile::new(RED, Controller::LocalPlayer))
        .expect("fresh session accepts its first faction");
    session
}

/// Register a barracks launcher on a new building entity.
///
/// # Panics
///
/// Panics if the faction is not registered.
pub fn add_barracks(session: &mut Session, faction: FactionId, entity: EntityId) -> LauncherId {
    let x = i32::try_from(entity % 64).unwrap_or_default();
    let launcher = TaskLauncher::new(
        LauncherId(0),
        faction,
        Holder::building(entity, "barracks", 500, at(x, 0)),
        barracks_catalog(),
    );
    session
        .register_launcher(launcher)
        .expect("fixture faction is registered")
}

/// Strategy book for an autonomous faction training spearmen.
#[must_use]
pub fn spearman_strategies() -> StrategyBook {
    StrategyBook::new()
        .with_strategy("pikeman")
        .with_strategy("fortress")
        .with_role(StrategyRole::Army, "spearman")
        .with_role(StrategyRole::CenterBuilding, "barracks")
}

/// Two-faction session: [`RED`] is the local player, [`BLUE`] is autonomous
/// with eager managers scanning every `interval` seconds. Each faction gets
/// `barracks` launchers.
#[must_use]
pub fn skirmish_session(seed: u64, barracks: u64, interval: i32) -> Session {
    let config = whole_second_config(seed)
        .with_auto_production(AutoProductionConfig::eager(fixed(interval)));
    let mut host = sandbox_host(&[RED, BLUE]);
    host.strategies.insert(BLUE, spearman_strategies());

    let mut session = Session::new(config, host).with_upgrades(standard_book());
    session.add_template(barracks_template("barracks"));
    session.add_template(barracks_template("fortress"));
    session
        .add_faction(FactionProfile::new(RED, Controller::LocalPlayer))
        .expect("fresh session accepts RED");
    session
        .add_faction(FactionProfile::new(BLUE, Controller::Autonomous))
        .expect("fresh session accepts BLUE");

    for i in 0..barracks {
        add_barracks(&mut session, RED, 100 + i);
        add_barracks(&mut session, BLUE, 200 + i);
    }
    session
}
