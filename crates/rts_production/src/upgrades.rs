//! Upgrade definitions and faction-wide upgrade propagation.
//!
//! An upgrade permanently replaces one entity type with another for a single
//! faction. Unit upgrades rewrite every matching creation task on every
//! launcher of the faction and are recorded so launchers registered later
//! receive the same rewrite. Building upgrades replace the standing building
//! instances and, for the local player, the placement menu.
//!
//! Trigger upgrades run depth-first in listed order. A cascade never applies
//! the same upgrade twice; a repeat is logged and skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::economy::ResourceCost;
use crate::error::{ProductionError, Result};
use crate::events::{EventBus, ProductionEvent};
use crate::factions::{FactionId, FactionProfile};
use crate::host::Host;
use crate::launcher::{LauncherId, TaskLauncher};
use crate::math::{fixed_decimal, Fixed, Vec2Fixed};
use crate::tasks::{TaskCatalog, TaskKind, TaskPayload, TypeCode, UnitPrefab};
use crate::world::{EntityId, PlacedBuilding, PlacementCatalog};

/// Unique identifier for an upgrade definition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpgradeId(pub String);

impl UpgradeId {
    /// Create a new upgrade ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for UpgradeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for UpgradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task metadata written into creation tasks rewritten by a unit upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReplacement {
    /// New tooltip text.
    #[serde(default)]
    pub description: String,
    /// New icon.
    #[serde(default)]
    pub icon: Option<String>,
    /// New reload time.
    #[serde(with = "fixed_decimal")]
    pub reload_time: Fixed,
    /// New cost.
    #[serde(default)]
    pub cost: Vec<ResourceCost>,
}

impl UnitReplacement {
    /// Rewrite every creation task whose first prefab is `source`.
    ///
    /// Returns the number of rewritten tasks.
    pub fn rewrite(&self, catalog: &mut TaskCatalog, source: &TypeCode, target: &TypeCode) -> usize {
        let mut rewritten = 0;
        for task in catalog.iter_mut() {
            if task.kind != TaskKind::CreateUnit || task.primary_unit() != Some(source) {
                continue;
            }
            task.payload = TaskPayload::CreateUnit {
                prefabs: vec![UnitPrefab::new(target.clone())],
            };
            task.description.clone_from(&self.description);
            task.icon.clone_from(&self.icon);
            task.reload_time = self.reload_time;
            task.cost.clone_from(&self.cost);
            rewritten += 1;
        }
        rewritten
    }
}

/// Replaces one unit type with another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitUpgrade {
    /// Upgrade ID.
    pub id: UpgradeId,
    /// Unit type being replaced.
    pub source: TypeCode,
    /// Replacement unit type.
    pub target: TypeCode,
    /// Metadata for rewritten creation tasks.
    pub replacement: UnitReplacement,
    /// Unit upgrades applied after this one.
    #[serde(default)]
    pub unit_triggers: Vec<UpgradeId>,
    /// Building upgrades applied after the unit triggers.
    #[serde(default)]
    pub building_triggers: Vec<UpgradeId>,
}

/// Replaces one building type with another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingUpgrade {
    /// Upgrade ID.
    pub id: UpgradeId,
    /// Building type being replaced.
    pub source: TypeCode,
    /// Replacement building type.
    pub target: TypeCode,
    /// Visual effect played at each replaced building for the local player.
    #[serde(default)]
    pub effect: Option<String>,
    /// Unit upgrades applied after this one.
    #[serde(default)]
    pub unit_triggers: Vec<UpgradeId>,
    /// Building upgrades applied after the unit triggers.
    #[serde(default)]
    pub building_triggers: Vec<UpgradeId>,
}

/// Which kind of entity an upgrade replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeKind {
    /// Unit upgrade.
    Unit,
    /// Building upgrade.
    Building,
}

impl UpgradeKind {
    /// Task kind that launches upgrades of this kind.
    #[must_use]
    pub const fn task_kind(self) -> TaskKind {
        match self {
            Self::Unit => TaskKind::UnitUpgrade,
            Self::Building => TaskKind::BuildingUpgrade,
        }
    }
}

/// A unit or building upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradeDefinition {
    /// Unit upgrade.
    Unit(UnitUpgrade),
    /// Building upgrade.
    Building(BuildingUpgrade),
}

impl UpgradeDefinition {
    /// Upgrade ID.
    #[must_use]
    pub const fn id(&self) -> &UpgradeId {
        match self {
            Self::Unit(u) => &u.id,
            Self::Building(b) => &b.id,
        }
    }

    /// Replaced type.
    #[must_use]
    pub const fn source(&self) -> &TypeCode {
        match self {
            Self::Unit(u) => &u.source,
            Self::Building(b) => &b.source,
        }
    }

    /// Replacement type.
    #[must_use]
    pub const fn target(&self) -> &TypeCode {
        match self {
            Self::Unit(u) => &u.target,
            Self::Building(b) => &b.target,
        }
    }

    /// Upgrade kind.
    #[must_use]
    pub const fn kind(&self) -> UpgradeKind {
        match self {
            Self::Unit(_) => UpgradeKind::Unit,
            Self::Building(_) => UpgradeKind::Building,
        }
    }

    /// Trigger upgrades in application order: unit triggers, then building
    /// triggers.
    pub fn triggers(&self) -> impl Iterator<Item = &UpgradeId> {
        let (units, buildings) = match self {
            Self::Unit(u) => (&u.unit_triggers, &u.building_triggers),
            Self::Building(b) => (&b.unit_triggers, &b.building_triggers),
        };
        units.iter().chain(buildings.iter())
    }

    fn propagation(&self) -> &dyn Propagation {
        match self {
            Self::Unit(u) => u,
            Self::Building(b) => b,
        }
    }
}

/// Record of a unit upgrade applied to a faction, replayed onto launchers
/// registered afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomousUpgradeRecord {
    /// Upgraded faction.
    pub faction: FactionId,
    /// Replaced unit type.
    pub source: TypeCode,
    /// Replacement unit type.
    pub target: TypeCode,
    /// Metadata written into rewritten tasks.
    pub replacement: UnitReplacement,
}

/// An upgrade applied during a cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedUpgrade {
    /// Upgrade ID.
    pub id: UpgradeId,
    /// Upgrade kind.
    pub kind: UpgradeKind,
    /// Replaced type.
    pub source: TypeCode,
    /// Replacement type.
    pub target: TypeCode,
}

/// Everything a cascade changed, for the session to follow up on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeOutcome {
    /// Upgrades applied, in application order.
    pub applied: Vec<AppliedUpgrade>,
    /// Creation tasks rewritten across all launchers.
    pub rewritten_tasks: usize,
    /// Building instances destroyed by building upgrades.
    pub destroyed: Vec<EntityId>,
    /// Replacement building instances.
    pub constructed: Vec<PlacedBuilding>,
}

/// Session state an upgrade cascade may touch.
pub struct UpgradeContext<'a> {
    /// Registered factions.
    pub factions: &'a BTreeMap<FactionId, FactionProfile>,
    /// Every launcher in the session.
    pub launchers: &'a mut BTreeMap<LauncherId, TaskLauncher>,
    /// Standing buildings.
    pub buildings: &'a mut BTreeMap<EntityId, PlacedBuilding>,
    /// Placement menus.
    pub placement: &'a mut PlacementCatalog,
    /// Event bus.
    pub events: &'a mut EventBus,
    /// External collaborators.
    pub host: &'a mut dyn Host,
    /// Where the upgrade was launched from. Building upgrade effects play
    /// here, or at the first replaced instance when unset.
    pub origin: Option<Vec2Fixed>,
}

/// Faction-wide effect of one upgrade definition.
trait Propagation {
    fn propagate(
        &self,
        faction: &FactionProfile,
        ctx: &mut UpgradeContext<'_>,
        records: &mut Vec<AutonomousUpgradeRecord>,
        outcome: &mut UpgradeOutcome,
    );
}

fn swap_strategy(
    ctx: &mut UpgradeContext<'_>,
    faction: &FactionProfile,
    source: &TypeCode,
    target: &TypeCode,
) {
    if !faction.is_autonomous() {
        return;
    }
    if let Err(err) = ctx.host.binding().swap_strategy(faction.id, source, target) {
        error!(faction = %faction.id, %source, %target, %err, "Strategy swap failed; upgrade continues");
    }
}

impl Propagation for UnitUpgrade {
    fn propagate(
        &self,
        faction: &FactionProfile,
        ctx: &mut UpgradeContext<'_>,
        records: &mut Vec<AutonomousUpgradeRecord>,
        outcome: &mut UpgradeOutcome,
    ) {
        ctx.events.publish(ProductionEvent::UnitUpgraded {
            upgrade: self.id.clone(),
            faction: faction.id,
            source: self.source.clone(),
            target: self.target.clone(),
        });

        let rewritten: usize = ctx
            .launchers
            .values_mut()
            .filter(|launcher| launcher.faction() == faction.id)
            .map(|launcher| {
                self.replacement
                    .rewrite(launcher.catalog_mut(), &self.source, &self.target)
            })
            .sum();

        records.push(AutonomousUpgradeRecord {
            faction: faction.id,
            source: self.source.clone(),
            target: self.target.clone(),
            replacement: self.replacement.clone(),
        });

        swap_strategy(ctx, faction, &self.source, &self.target);

        info!(
            upgrade = %self.id,
            faction = %faction.id,
            source = %self.source,
            target = %self.target,
            rewritten,
            "Unit upgrade applied"
        );
        outcome.rewritten_tasks += rewritten;
        outcome.applied.push(AppliedUpgrade {
            id: self.id.clone(),
            kind: UpgradeKind::Unit,
            source: self.source.clone(),
            target: self.target.clone(),
        });
    }
}

impl Propagation for BuildingUpgrade {
    fn propagate(
        &self,
        faction: &FactionProfile,
        ctx: &mut UpgradeContext<'_>,
        _records: &mut Vec<AutonomousUpgradeRecord>,
        outcome: &mut UpgradeOutcome,
    ) {
        ctx.events.publish(ProductionEvent::BuildingUpgraded {
            upgrade: self.id.clone(),
            faction: faction.id,
            source: self.source.clone(),
            target: self.target.clone(),
        });

        let matching: Vec<EntityId> = ctx
            .buildings
            .values()
            .filter(|b| b.faction == faction.id && b.code == self.source)
            .map(|b| b.entity)
            .collect();

        let mut first_replaced = None;
        for entity in matching {
            let Some(old) = ctx.buildings.remove(&entity) else {
                continue;
            };
            first_replaced.get_or_insert(old.position);
            ctx.host.lifecycle().destroy_entity(old.entity);
            for launcher in ctx.launchers.values_mut() {
                if launcher.holder().entity() == old.entity {
                    launcher.holder_mut().mark_destroyed();
                }
            }

            let replacement = ctx.host.lifecycle().construct_placed_instance(
                &self.target,
                old.position,
                old.territory,
                faction.id,
            );

            let placed = PlacedBuilding {
                entity: replacement,
                code: self.target.clone(),
                ..old
            };
            ctx.buildings.insert(replacement, placed.clone());
            outcome.destroyed.push(entity);
            outcome.constructed.push(placed);
        }

        if faction.is_local_player() {
            if let (Some(effect), Some(position)) = (&self.effect, ctx.origin.or(first_replaced)) {
                ctx.host.effects().play_upgrade_effect(effect, position);
            }
            ctx.placement.replace(faction.id, &self.source, &self.target);
        }

        swap_strategy(ctx, faction, &self.source, &self.target);

        info!(
            upgrade = %self.id,
            faction = %faction.id,
            source = %self.source,
            target = %self.target,
            "Building upgrade applied"
        );
        outcome.applied.push(AppliedUpgrade {
            id: self.id.clone(),
            kind: UpgradeKind::Building,
            source: self.source.clone(),
            target: self.target.clone(),
        });
    }
}

/// All upgrade definitions known to a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeBook {
    upgrades: BTreeMap<UpgradeId, UpgradeDefinition>,
}

impl UpgradeBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a definition.
    pub fn insert(&mut self, upgrade: UpgradeDefinition) {
        self.upgrades.insert(upgrade.id().clone(), upgrade);
    }

    /// Add a definition, builder style.
    #[must_use]
    pub fn with(mut self, upgrade: UpgradeDefinition) -> Self {
        self.insert(upgrade);
        self
    }

    /// Look up a definition.
    #[must_use]
    pub fn get(&self, id: &UpgradeId) -> Option<&UpgradeDefinition> {
        self.upgrades.get(id)
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.upgrades.len()
    }

    /// Whether the book is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upgrades.is_empty()
    }

    /// Definitions in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &UpgradeDefinition> {
        self.upgrades.values()
    }

    /// Check that every trigger exists and no trigger chain loops.
    pub fn validate(&self) -> Result<()> {
        for upgrade in self.upgrades.values() {
            if let Some(missing) = upgrade.triggers().find(|id| !self.upgrades.contains_key(*id)) {
                return Err(ProductionError::UnknownUpgrade(missing.clone()));
            }
        }

        let mut done = BTreeSet::new();
        for id in self.upgrades.keys() {
            let mut path = Vec::new();
            self.visit(id, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        id: &'a UpgradeId,
        path: &mut Vec<&'a UpgradeId>,
        done: &mut BTreeSet<&'a UpgradeId>,
    ) -> Result<()> {
        if done.contains(id) {
            return Ok(());
        }
        if path.contains(&id) {
            return Err(ProductionError::UpgradeCycle(id.clone()));
        }
        path.push(id);
        if let Some(upgrade) = self.upgrades.get(id) {
            for trigger in upgrade.triggers() {
                self.visit(trigger, path, done)?;
            }
        }
        path.pop();
        done.insert(id);
        Ok(())
    }
}

/// Applies upgrades and remembers unit upgrades per faction.
#[derive(Debug, Clone, Default)]
pub struct UpgradeCoordinator {
    book: UpgradeBook,
    records: Vec<AutonomousUpgradeRecord>,
}

impl UpgradeCoordinator {
    /// Create a coordinator for an upgrade book.
    #[must_use]
    pub fn new(book: UpgradeBook) -> Self {
        Self {
            book,
            records: Vec::new(),
        }
    }

    /// The upgrade book.
    #[must_use]
    pub const fn book(&self) -> &UpgradeBook {
        &self.book
    }

    /// Mutable upgrade book.
    pub fn book_mut(&mut self) -> &mut UpgradeBook {
        &mut self.book
    }

    /// Every unit upgrade applied so far, in application order.
    #[must_use]
    pub fn records(&self) -> &[AutonomousUpgradeRecord] {
        &self.records
    }

    pub(crate) fn restore_records(&mut self, records: Vec<AutonomousUpgradeRecord>) {
        self.records = records;
    }

    /// Apply an upgrade and its triggers to a faction.
    ///
    /// An unregistered faction makes the call a logged no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::UnknownUpgrade`] if `id` is not in the book.
    /// Unknown triggers and repeated upgrades inside the cascade are skipped.
    pub fn apply(
        &mut self,
        id: &UpgradeId,
        faction: FactionId,
        ctx: &mut UpgradeContext<'_>,
    ) -> Result<UpgradeOutcome> {
        if self.book.get(id).is_none() {
            return Err(ProductionError::UnknownUpgrade(id.clone()));
        }
        let mut outcome = UpgradeOutcome::default();
        let Some(profile) = ctx.factions.get(&faction).cloned() else {
            warn!(upgrade = %id, %faction, "Upgrade skipped for unregistered faction");
            return Ok(outcome);
        };

        let mut visited = BTreeSet::new();
        self.cascade(id, &profile, ctx, &mut visited, &mut outcome);
        Ok(outcome)
    }

    fn cascade(
        &mut self,
        id: &UpgradeId,
        faction: &FactionProfile,
        ctx: &mut UpgradeContext<'_>,
        visited: &mut BTreeSet<UpgradeId>,
        outcome: &mut UpgradeOutcome,
    ) {
        if !visited.insert(id.clone()) {
            warn!(upgrade = %id, faction = %faction.id, "Upgrade already applied in this cascade, skipping");
            return;
        }
        let Some(upgrade) = self.book.get(id).cloned() else {
            warn!(upgrade = %id, faction = %faction.id, "Unknown trigger upgrade, skipping");
            return;
        };

        upgrade
            .propagation()
            .propagate(faction, ctx, &mut self.records, outcome);

        for trigger in upgrade.triggers() {
            self.cascade(trigger, faction, ctx, visited, outcome);
        }
    }

    /// Apply every recorded unit upgrade of the launcher's faction to its
    /// catalog, oldest first. Returns the number of rewritten tasks.
    pub fn replay(&self, launcher: &mut TaskLauncher) -> usize {
        let faction = launcher.faction();
        self.records
            .iter()
            .filter(|record| record.faction == faction)
            .map(|record| {
                record
                    .replacement
                    .rewrite(launcher.catalog_mut(), &record.source, &record.target)
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::strategy::{StrategyBook, StrategyRole};
    use crate::factions::Controller;
    use crate::host::SandboxHost;
    use crate::math::Vec2Fixed;
    use crate::tasks::TaskDefinition;
    use crate::world::Holder;

    const RED: FactionId = FactionId(1);
    const AI: FactionId = FactionId(2);

    fn secs(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn unit_upgrade(id: &str, source: &str, target: &str) -> UnitUpgrade {
        UnitUpgrade {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            replacement: UnitReplacement {
                description: format!("Train {target}"),
                icon: Some(format!("{target}.png")),
                reload_time: secs(7),
                cost: vec![ResourceCost::new("gold", 60)],
            },
            unit_triggers: Vec::new(),
            building_triggers: Vec::new(),
        }
    }

    fn building_upgrade(id: &str, source: &str, target: &str) -> BuildingUpgrade {
        BuildingUpgrade {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            effect: Some("upgrade_flash".into()),
            unit_triggers: Vec::new(),
            building_triggers: Vec::new(),
        }
    }

    struct World {
        factions: BTreeMap<FactionId, FactionProfile>,
        launchers: BTreeMap<LauncherId, TaskLauncher>,
        buildings: BTreeMap<EntityId, PlacedBuilding>,
        placement: PlacementCatalog,
        events: EventBus,
        host: SandboxHost,
    }

    impl World {
        fn new() -> Self {
            let mut factions = BTreeMap::new();
            factions.insert(RED, FactionProfile::new(RED, Controller::LocalPlayer));
            factions.insert(AI, FactionProfile::new(AI, Controller::Autonomous));
            Self {
                factions,
                launchers: BTreeMap::new(),
                buildings: BTreeMap::new(),
                placement: PlacementCatalog::new(),
                events: EventBus::new(),
                host: SandboxHost::new(),
            }
        }

        fn add_barracks(&mut self, id: u32, faction: FactionId) {
            let catalog = TaskCatalog::new(vec![
                TaskDefinition::create_unit("train_spearman", vec![UnitPrefab::new("spearman")], secs(5)),
                TaskDefinition::create_unit("train_archer", vec![UnitPrefab::new("archer")], secs(4)),
            ])
            .unwrap();
            let entity = u64::from(id);
            self.launchers.insert(
                LauncherId(id),
                TaskLauncher::new(
                    LauncherId(id),
                    faction,
                    Holder::building(entity, "barracks", 500, Vec2Fixed::ZERO),
                    catalog,
                ),
            );
        }

        fn add_building(&mut self, entity: EntityId, code: &str, faction: FactionId) {
            self.buildings.insert(
                entity,
                PlacedBuilding {
                    entity,
                    code: code.into(),
                    faction,
                    health: 400,
                    position: Vec2Fixed::from_ints(i32::try_from(entity).unwrap(), 0),
                    territory: None,
                },
            );
        }

        fn apply(
            &mut self,
            coordinator: &mut UpgradeCoordinator,
            id: &str,
            faction: FactionId,
        ) -> UpgradeOutcome {
            let mut ctx = UpgradeContext {
                factions: &self.factions,
                launchers: &mut self.launchers,
                buildings: &mut self.buildings,
                placement: &mut self.placement,
                events: &mut self.events,
                host: &mut self.host,
                origin: None,
            };
            coordinator.apply(&id.into(), faction, &mut ctx).unwrap()
        }

        fn prefab_of(&self, launcher: u32, task: usize) -> TypeCode {
            self.launchers[&LauncherId(launcher)]
                .catalog()
                .get(task)
                .unwrap()
                .primary_unit()
                .unwrap()
                .clone()
        }
    }

    #[test]
    fn test_unit_upgrade_rewrites_faction_launchers_only() {
        let mut world = World::new();
        world.add_barracks(1, RED);
        world.add_barracks(2, RED);
        world.add_barracks(3, AI);

        let mut coordinator = UpgradeCoordinator::new(
            UpgradeBook::new().with(UpgradeDefinition::Unit(unit_upgrade("pikes", "spearman", "pikeman"))),
        );
        let outcome = world.apply(&mut coordinator, "pikes", RED);

        assert_eq!(outcome.rewritten_tasks, 2);
        for id in [1, 2] {
            assert_eq!(world.prefab_of(id, 0).as_str(), "pikeman");
            let task = world.launchers[&LauncherId(id)].catalog().get(0).unwrap();
            assert_eq!(task.reload_time, secs(7));
            assert_eq!(task.description, "Train pikeman");
            assert_eq!(task.cost, vec![ResourceCost::new("gold", 60)]);
            assert_eq!(world.prefab_of(id, 1).as_str(), "archer");
        }
        assert_eq!(world.prefab_of(3, 0).as_str(), "spearman");
        assert_eq!(coordinator.records().len(), 1);
        assert!(matches!(
            world.events.take_current().as_slice(),
            [ProductionEvent::UnitUpgraded { faction: RED, .. }]
        ));
    }

    #[test]
    fn test_replay_for_late_launcher() {
        let mut world = World::new();
        world.add_barracks(1, RED);
        let mut coordinator = UpgradeCoordinator::new(
            UpgradeBook::new().with(UpgradeDefinition::Unit(unit_upgrade("pikes", "spearman", "pikeman"))),
        );
        world.apply(&mut coordinator, "pikes", RED);

        world.add_barracks(2, RED);
        let mut late = world.launchers.remove(&LauncherId(2)).unwrap();
        assert_eq!(coordinator.replay(&mut late), 1);
        assert_eq!(late.catalog().get(0).unwrap().primary_unit().unwrap().as_str(), "pikeman");

        world.add_barracks(3, AI);
        let mut other = world.launchers.remove(&LauncherId(3)).unwrap();
        assert_eq!(coordinator.replay(&mut other), 0);
    }

    #[test]
    fn test_trigger_chain_applies_in_one_call() {
        let mut world = World::new();
        world.add_barracks(1, RED);

        let mut first = unit_upgrade("pikes", "spearman", "pikeman");
        first.unit_triggers.push("longbows".into());
        let mut coordinator = UpgradeCoordinator::new(
            UpgradeBook::new()
                .with(UpgradeDefinition::Unit(first))
                .with(UpgradeDefinition::Unit(unit_upgrade("longbows", "archer", "longbowman"))),
        );
        let outcome = world.apply(&mut coordinator, "pikes", RED);

        assert_eq!(outcome.applied.len(), 2);
        assert_eq!(world.prefab_of(1, 0).as_str(), "pikeman");
        assert_eq!(world.prefab_of(1, 1).as_str(), "longbowman");
    }

    #[test]
    fn test_cycle_is_cut() {
        let mut world = World::new();
        world.add_barracks(1, RED);

        let mut forward = unit_upgrade("forward", "spearman", "pikeman");
        forward.unit_triggers.push("back".into());
        let mut back = unit_upgrade("back", "pikeman", "spearman");
        back.unit_triggers.push("forward".into());
        let book = UpgradeBook::new()
            .with(UpgradeDefinition::Unit(forward))
            .with(UpgradeDefinition::Unit(back));
        assert!(matches!(book.validate(), Err(ProductionError::UpgradeCycle(_))));

        let mut coordinator = UpgradeCoordinator::new(book);
        let outcome = world.apply(&mut coordinator, "forward", RED);
        assert_eq!(outcome.applied.len(), 2);
        assert_eq!(world.prefab_of(1, 0).as_str(), "spearman");
    }

    #[test]
    fn test_unknown_upgrade_and_faction() {
        let mut world = World::new();
        let mut coordinator = UpgradeCoordinator::new(UpgradeBook::new().with(
            UpgradeDefinition::Unit(unit_upgrade("pikes", "spearman", "pikeman")),
        ));
        let mut ctx = UpgradeContext {
            factions: &world.factions,
            launchers: &mut world.launchers,
            buildings: &mut world.buildings,
            placement: &mut world.placement,
            events: &mut world.events,
            host: &mut world.host,
            origin: None,
        };
        assert!(matches!(
            coordinator.apply(&"missing".into(), RED, &mut ctx),
            Err(ProductionError::UnknownUpgrade(_))
        ));
        let outcome = coordinator.apply(&"pikes".into(), FactionId(42), &mut ctx).unwrap();
        assert!(outcome.applied.is_empty());
        assert!(coordinator.records().is_empty());
    }

    #[test]
    fn test_building_upgrade_replaces_instances() {
        let mut world = World::new();
        world.add_building(5, "tower", RED);
        world.add_building(6, "tower", RED);
        world.add_building(7, "tower", AI);
        world.add_building(8, "house", RED);
        world
            .placement
            .set(RED, vec!["house".into(), "tower".into()]);

        let mut coordinator = UpgradeCoordinator::new(UpgradeBook::new().with(
            UpgradeDefinition::Building(building_upgrade("keep", "tower", "keep")),
        ));
        let outcome = world.apply(&mut coordinator, "keep", RED);

        assert_eq!(outcome.destroyed, vec![5, 6]);
        assert_eq!(outcome.constructed.len(), 2);
        assert_eq!(world.host.world.destroyed, vec![5, 6]);
        let constructed = &world.host.world.constructed;
        assert_eq!(constructed.len(), 2);
        assert_eq!(constructed[0].position, Vec2Fixed::from_ints(5, 0));
        assert!(constructed.iter().all(|c| c.code.as_str() == "keep" && c.faction == RED));

        assert!(world.buildings.contains_key(&7));
        assert!(world.buildings.contains_key(&8));
        assert_eq!(
            world.buildings.values().filter(|b| b.code.as_str() == "keep").count(),
            2
        );
        assert_eq!(world.placement.get(RED)[1].as_str(), "keep");
        assert_eq!(
            world.host.feedback.effects,
            vec![("upgrade_flash".to_owned(), Vec2Fixed::from_ints(5, 0))]
        );
        assert!(coordinator.records().is_empty());
    }

    #[test]
    fn test_building_upgrade_effect_plays_once_at_origin() {
        let mut world = World::new();
        world.add_building(5, "tower", RED);
        world.add_building(6, "tower", RED);
        let mut coordinator = UpgradeCoordinator::new(UpgradeBook::new().with(
            UpgradeDefinition::Building(building_upgrade("keep", "tower", "keep")),
        ));

        let origin = Vec2Fixed::from_ints(40, 40);
        let mut ctx = UpgradeContext {
            factions: &world.factions,
            launchers: &mut world.launchers,
            buildings: &mut world.buildings,
            placement: &mut world.placement,
            events: &mut world.events,
            host: &mut world.host,
            origin: Some(origin),
        };
        let outcome = coordinator.apply(&"keep".into(), RED, &mut ctx).unwrap();

        assert_eq!(outcome.destroyed.len(), 2);
        assert_eq!(world.host.feedback.effects, vec![("upgrade_flash".to_owned(), origin)]);
    }

    #[test]
    fn test_building_upgrade_marks_holder_launchers_destroyed() {
        let mut world = World::new();
        world.add_barracks(1, RED);
        world.add_building(1, "barracks", RED);
        let mut coordinator = UpgradeCoordinator::new(UpgradeBook::new().with(
            UpgradeDefinition::Building(building_upgrade("fort", "barracks", "fortress")),
        ));
        world.apply(&mut coordinator, "fort", RED);
        assert!(!world.launchers[&LauncherId(1)].can_operate());
    }

    #[test]
    fn test_autonomous_strategy_swap() {
        let mut world = World::new();
        world.host.strategies.insert(
            AI,
            StrategyBook::new()
                .with_role(StrategyRole::Army, "spearman")
                .with_strategy("pikeman"),
        );
        world.add_building(9, "tower", AI);
        let mut coordinator = UpgradeCoordinator::new(
            UpgradeBook::new()
                .with(UpgradeDefinition::Unit(unit_upgrade("pikes", "spearman", "pikeman")))
                .with(UpgradeDefinition::Building(building_upgrade("keep", "tower", "keep"))),
        );
        world.apply(&mut coordinator, "pikes", AI);

        let book = world.host.strategies.get(AI).unwrap();
        assert_eq!(book.role(StrategyRole::Army).unwrap().as_str(), "pikeman");

        // No strategy for towers: logged, the building is still replaced.
        let outcome = world.apply(&mut coordinator, "keep", AI);
        assert_eq!(outcome.destroyed, vec![9]);
        assert!(world.host.feedback.effects.is_empty());
    }

    #[test]
    fn test_validate_unknown_trigger() {
        let mut upgrade = unit_upgrade("pikes", "spearman", "pikeman");
        upgrade.building_triggers.push("nowhere".into());
        let book = UpgradeBook::new().with(UpgradeDefinition::Unit(upgrade));
        assert!(matches!(book.validate(), Err(ProductionError::UnknownUpgrade(_))));
    }

    #[test]
    fn test_validate_diamond_is_fine() {
        let mut top = unit_upgrade("top", "a", "b");
        top.unit_triggers = vec!["left".into(), "right".into()];
        let mut left = unit_upgrade("left", "c", "d");
        left.unit_triggers.push("bottom".into());
        let mut right = unit_upgrade("right", "e", "f");
        right.unit_triggers.push("bottom".into());
        let book = UpgradeBook::new()
            .with(UpgradeDefinition::Unit(top))
            .with(UpgradeDefinition::Unit(left))
            .with(UpgradeDefinition::Unit(right))
            .with(UpgradeDefinition::Unit(unit_upgrade("bottom", "g", "h")));
        assert!(book.validate().is_ok());
    }
}
