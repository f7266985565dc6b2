//! Task holders and the entity-side collaborators.
//!
//! A launcher is attached to exactly one holder, either a unit or a building.
//! Spawning, destroying and selecting entities belong to the wider game; the
//! traits here are the only way the production subsystem reaches them.
//! [`WorldRecorder`] implements all of them by recording requests.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::factions::FactionId;
use crate::math::Vec2Fixed;
use crate::tasks::TypeCode;

/// Unique identifier for entities.
pub type EntityId = u64;

/// Territory (border center) a building belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TerritoryId(pub u32);

/// Unit holding a launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitHolder {
    /// The unit entity.
    pub entity: EntityId,
    /// Unit type code.
    pub code: TypeCode,
    /// Current health.
    pub health: i32,
    /// Whether the unit has died.
    pub dead: bool,
    /// Current position; new units spawn here.
    pub position: Vec2Fixed,
}

/// Building holding a launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingHolder {
    /// The building entity.
    pub entity: EntityId,
    /// Building type code.
    pub code: TypeCode,
    /// Current health.
    pub health: i32,
    /// Whether construction has finished.
    pub is_built: bool,
    /// Whether the building has been destroyed.
    pub destroyed: bool,
    /// Building position.
    pub position: Vec2Fixed,
    /// Where produced units appear.
    pub spawn_position: Vec2Fixed,
    /// Territory the building belongs to.
    pub territory: Option<TerritoryId>,
}

/// Lifecycle state relevant to launching tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Able to operate.
    Alive,
    /// Building still under construction.
    NotBuilt,
    /// Unit dead or building destroyed.
    Destroyed,
}

/// The entity a launcher is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Holder {
    /// Launcher on a unit.
    Unit(UnitHolder),
    /// Launcher on a building.
    Building(BuildingHolder),
}

impl Holder {
    /// A living unit holder.
    #[must_use]
    pub fn unit(entity: EntityId, code: impl Into<TypeCode>, health: i32, position: Vec2Fixed) -> Self {
        Self::Unit(UnitHolder {
            entity,
            code: code.into(),
            health,
            dead: false,
            position,
        })
    }

    /// A fully built building holder spawning units at its own position.
    #[must_use]
    pub fn building(
        entity: EntityId,
        code: impl Into<TypeCode>,
        health: i32,
        position: Vec2Fixed,
    ) -> Self {
        Self::Building(BuildingHolder {
            entity,
            code: code.into(),
            health,
            is_built: true,
            destroyed: false,
            position,
            spawn_position: position,
            territory: None,
        })
    }

    /// The holder entity.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::Unit(unit) => unit.entity,
            Self::Building(building) => building.entity,
        }
    }

    /// The holder's type code.
    #[must_use]
    pub const fn code(&self) -> &TypeCode {
        match self {
            Self::Unit(unit) => &unit.code,
            Self::Building(building) => &building.code,
        }
    }

    /// Current health.
    #[must_use]
    pub const fn health(&self) -> i32 {
        match self {
            Self::Unit(unit) => unit.health,
            Self::Building(building) => building.health,
        }
    }

    /// Set current health.
    pub fn set_health(&mut self, health: i32) {
        match self {
            Self::Unit(unit) => unit.health = health,
            Self::Building(building) => building.health = health,
        }
    }

    /// Mark the unit dead or the building destroyed.
    pub fn mark_destroyed(&mut self) {
        match self {
            Self::Unit(unit) => unit.dead = true,
            Self::Building(building) => building.destroyed = true,
        }
    }

    /// Lifecycle state. Destruction is reported before construction state.
    #[must_use]
    pub const fn liveness(&self) -> Liveness {
        match self {
            Self::Unit(unit) if unit.dead => Liveness::Destroyed,
            Self::Unit(_) => Liveness::Alive,
            Self::Building(building) if building.destroyed => Liveness::Destroyed,
            Self::Building(building) if !building.is_built => Liveness::NotBuilt,
            Self::Building(_) => Liveness::Alive,
        }
    }

    /// Where the holder stands.
    #[must_use]
    pub const fn position(&self) -> Vec2Fixed {
        match self {
            Self::Unit(unit) => unit.position,
            Self::Building(building) => building.position,
        }
    }

    /// Where units produced by this holder appear.
    #[must_use]
    pub const fn spawn_position(&self) -> Vec2Fixed {
        match self {
            Self::Unit(unit) => unit.position,
            Self::Building(building) => building.spawn_position,
        }
    }

    /// The holder entity if it is a building; produced units record it as parent.
    #[must_use]
    pub const fn building_entity(&self) -> Option<EntityId> {
        match self {
            Self::Unit(_) => None,
            Self::Building(building) => Some(building.entity),
        }
    }
}

/// A standing building known to the session, with or without a launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedBuilding {
    /// The building entity.
    pub entity: EntityId,
    /// Building type code.
    pub code: TypeCode,
    /// Owning faction.
    pub faction: FactionId,
    /// Health carried over to replacements.
    pub health: i32,
    /// Position.
    pub position: Vec2Fixed,
    /// Territory the building belongs to.
    pub territory: Option<TerritoryId>,
}

/// Building types each faction may place, in menu order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementCatalog {
    entries: BTreeMap<FactionId, Vec<TypeCode>>,
}

impl PlacementCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a faction's placeable types.
    pub fn set(&mut self, faction: FactionId, codes: Vec<TypeCode>) {
        self.entries.insert(faction, codes);
    }

    /// A faction's placeable types.
    #[must_use]
    pub fn get(&self, faction: FactionId) -> &[TypeCode] {
        self.entries.get(&faction).map_or(&[], Vec::as_slice)
    }

    /// Replace `source` with `target` in a faction's list. Returns how many
    /// entries changed.
    pub fn replace(&mut self, faction: FactionId, source: &TypeCode, target: &TypeCode) -> usize {
        let Some(codes) = self.entries.get_mut(&faction) else {
            return 0;
        };
        let mut replaced = 0;
        for code in codes.iter_mut().filter(|code| **code == *source) {
            code.clone_from(target);
            replaced += 1;
        }
        replaced
    }
}

/// Spawns and destroys entities.
pub trait EntityLifecycle {
    /// Create a unit of `prefab` owned by `faction`.
    fn spawn_unit(
        &mut self,
        prefab: &TypeCode,
        position: Vec2Fixed,
        faction: FactionId,
        parent: Option<EntityId>,
    ) -> EntityId;

    /// Destroy an entity.
    fn destroy_entity(&mut self, entity: EntityId);

    /// Create an already-placed building instance (used by building upgrades).
    fn construct_placed_instance(
        &mut self,
        code: &TypeCode,
        position: Vec2Fixed,
        territory: Option<TerritoryId>,
        faction: FactionId,
    ) -> EntityId;
}

/// Player selection state.
pub trait SelectionTracker {
    /// Whether the entity is currently selected.
    fn is_selected(&self, entity: EntityId) -> bool;

    /// Remove the entity from the selection.
    fn deselect(&mut self, entity: EntityId);
}

/// Input replication for multi-party sessions.
pub trait ReplicationChannel {
    /// Ask the authoritative peer to create a unit.
    fn send_creation_intent(
        &mut self,
        prefab: &TypeCode,
        target_holder: Option<EntityId>,
        position: Vec2Fixed,
    );
}

/// A unit spawn request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRecord {
    /// Entity assigned to the new unit.
    pub entity: EntityId,
    /// Unit type.
    pub prefab: TypeCode,
    /// Spawn position.
    pub position: Vec2Fixed,
    /// Owning faction.
    pub faction: FactionId,
    /// Producing building, if any.
    pub parent: Option<EntityId>,
}

/// A placed-building construction request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructRecord {
    /// Entity assigned to the new building.
    pub entity: EntityId,
    /// Building type.
    pub code: TypeCode,
    /// Position.
    pub position: Vec2Fixed,
    /// Territory.
    pub territory: Option<TerritoryId>,
    /// Owning faction.
    pub faction: FactionId,
}

/// A replicated creation intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationIntent {
    /// Unit type.
    pub prefab: TypeCode,
    /// Producing building, if any.
    pub target_holder: Option<EntityId>,
    /// Spawn position.
    pub position: Vec2Fixed,
}

/// Records every entity request instead of acting on a real world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldRecorder {
    next_entity: EntityId,
    /// Units spawned.
    pub spawned: Vec<SpawnRecord>,
    /// Entities destroyed.
    pub destroyed: Vec<EntityId>,
    /// Buildings constructed.
    pub constructed: Vec<ConstructRecord>,
    /// Creation intents sent.
    pub intents: Vec<CreationIntent>,
    /// Currently selected entities.
    pub selected: BTreeSet<EntityId>,
}

impl WorldRecorder {
    /// First entity ID handed out by default.
    pub const FIRST_ENTITY: EntityId = 10_000;

    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_entity: Self::FIRST_ENTITY,
            ..Self::default()
        }
    }

    /// Mark an entity as selected.
    pub fn select(&mut self, entity: EntityId) {
        self.selected.insert(entity);
    }

    fn allocate(&mut self) -> EntityId {
        let id = self.next_entity.max(Self::FIRST_ENTITY);
        self.next_entity = id + 1;
        id
    }
}

impl EntityLifecycle for WorldRecorder {
    fn spawn_unit(
        &mut self,
        prefab: &TypeCode,
        position: Vec2Fixed,
        faction: FactionId,
        parent: Option<EntityId>,
    ) -> EntityId {
        let entity = self.allocate();
        self.spawned.push(SpawnRecord {
            entity,
            prefab: prefab.clone(),
            position,
            faction,
            parent,
        });
        entity
    }

    fn destroy_entity(&mut self, entity: EntityId) {
        self.destroyed.push(entity);
    }

    fn construct_placed_instance(
        &mut self,
        code: &TypeCode,
        position: Vec2Fixed,
        territory: Option<TerritoryId>,
        faction: FactionId,
    ) -> EntityId {
        let entity = self.allocate();
        self.constructed.push(ConstructRecord {
            entity,
            code: code.clone(),
            position,
            territory,
            faction,
        });
        entity
    }
}

impl SelectionTracker for WorldRecorder {
    fn is_selected(&self, entity: EntityId) -> bool {
        self.selected.contains(&entity)
    }

    fn deselect(&mut self, entity: EntityId) {
        self.selected.remove(&entity);
    }
}

impl ReplicationChannel for WorldRecorder {
    fn send_creation_intent(
        &mut self,
        prefab: &TypeCode,
        target_holder: Option<EntityId>,
        position: Vec2Fixed,
    ) {
        self.intents.push(CreationIntent {
            prefab: prefab.clone(),
            target_holder,
            position,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_liveness() {
        let mut holder = Holder::unit(1, "spearman", 100, Vec2Fixed::ZERO);
        assert_eq!(holder.liveness(), Liveness::Alive);
        holder.mark_destroyed();
        assert_eq!(holder.liveness(), Liveness::Destroyed);
    }

    #[test]
    fn test_building_liveness_order() {
        let mut holder = Holder::building(2, "barracks", 500, Vec2Fixed::ZERO);
        if let Holder::Building(building) = &mut holder {
            building.is_built = false;
        }
        assert_eq!(holder.liveness(), Liveness::NotBuilt);

        holder.mark_destroyed();
        assert_eq!(holder.liveness(), Liveness::Destroyed);
    }

    #[test]
    fn test_spawn_position_and_parent() {
        let unit = Holder::unit(1, "villager", 50, Vec2Fixed::from_ints(3, 4));
        assert_eq!(unit.spawn_position(), Vec2Fixed::from_ints(3, 4));
        assert_eq!(unit.building_entity(), None);

        let mut building = Holder::building(7, "barracks", 500, Vec2Fixed::from_ints(10, 10));
        if let Holder::Building(b) = &mut building {
            b.spawn_position = Vec2Fixed::from_ints(12, 10);
        }
        assert_eq!(building.spawn_position(), Vec2Fixed::from_ints(12, 10));
        assert_eq!(building.building_entity(), Some(7));
    }

    #[test]
    fn test_recorder_allocates_unique_ids() {
        let mut world = WorldRecorder::new();
        let a = world.spawn_unit(&"a".into(), Vec2Fixed::ZERO, FactionId(1), None);
        let b = world.construct_placed_instance(&"b".into(), Vec2Fixed::ZERO, None, FactionId(1));
        assert_ne!(a, b);
        assert_eq!(world.spawned.len(), 1);
        assert_eq!(world.constructed.len(), 1);
    }

    #[test]
    fn test_placement_replace() {
        let mut placement = PlacementCatalog::new();
        let red = FactionId(1);
        placement.set(red, vec!["house".into(), "tower".into(), "house".into()]);
        assert_eq!(placement.replace(red, &"house".into(), &"manor".into()), 2);
        assert_eq!(
            placement.get(red),
            &[TypeCode::new("manor"), TypeCode::new("tower"), TypeCode::new("manor")]
        );
        assert!(placement.get(FactionId(2)).is_empty());
        assert_eq!(placement.replace(FactionId(2), &"house".into(), &"manor".into()), 0);
    }

    #[test]
    fn test_recorder_selection() {
        let mut world = WorldRecorder::new();
        world.select(5);
        assert!(world.is_selected(5));
        world.deselect(5);
        assert!(!world.is_selected(5));
    }
}
