//! Task definitions and per-launcher task catalogs.
//!
//! A [`TaskCatalog`] is the ordered list of tasks one launcher offers. Queue
//! entries refer to catalog entries by index, so the order is stable for the
//! lifetime of the launcher; upgrades rewrite entries in place.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::economy::ResourceCost;
use crate::error::{ProductionError, Result};
use crate::math::{fixed_decimal, Fixed};
use crate::upgrades::UpgradeId;

/// Stable code identifying an entity type (unit or building prefab).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeCode(pub String);

impl TypeCode {
    /// Create a new type code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique code for a task, shared by every launcher offering it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskCode(pub String);

impl TaskCode {
    /// Create a new task code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }
}

impl From<&str> for TaskCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for TaskCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of behaviors a task can have.
///
/// Only `CreateUnit`, `Destroy`, `UnitUpgrade`, `BuildingUpgrade` and
/// `Custom` have queue-completion effects; the remaining kinds are component
/// commands handled by other subsystems and are carried for completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Move order.
    Move,
    /// Start placing a building.
    PlaceBuilding,
    /// Construct a placed building.
    Build,
    /// Collect generated resources.
    ResourceGen,
    /// Gather from a resource node.
    Collect,
    /// Convert an enemy unit.
    Convert,
    /// Heal a friendly unit.
    Heal,
    /// Release units from a transport.
    APCRelease,
    /// Call units into a transport.
    APCCall,
    /// Produce a unit when the task completes.
    CreateUnit,
    /// Destroy the holding building.
    DestroyHolder,
    /// Cancel a pending queue entry immediately.
    CancelPending,
    /// Toggle unit invisibility.
    ToggleInvisibility,
    /// Pick the active attack type.
    AttackTypeSelect,
    /// Attack order.
    Attack,
    /// Toggle wandering.
    ToggleWander,
    /// Apply a unit upgrade when the task completes.
    UnitUpgrade,
    /// Apply a building upgrade when the task completes.
    BuildingUpgrade,
    /// Destroy the task holder when the task completes.
    Destroy,
    /// Game-defined task with no built-in effect.
    Custom,
}

/// One candidate prefab for a unit-creation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPrefab {
    /// Unit type to spawn.
    pub code: TypeCode,
    /// Relative pick weight.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

const fn default_weight() -> u32 {
    1
}

impl UnitPrefab {
    /// A prefab with weight 1.
    #[must_use]
    pub fn new(code: impl Into<TypeCode>) -> Self {
        Self {
            code: code.into(),
            weight: default_weight(),
        }
    }

    /// Set the pick weight.
    #[must_use]
    pub const fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// Kind-specific task data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TaskPayload {
    /// No extra data.
    #[default]
    None,
    /// Prefab set for `CreateUnit` tasks.
    CreateUnit {
        /// Candidates; the first entry identifies the task for upgrades.
        prefabs: Vec<UnitPrefab>,
    },
    /// Upgrade reference for `UnitUpgrade` and `BuildingUpgrade` tasks.
    Upgrade(UpgradeId),
}

/// Definition of a task offered by a launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Unique task code.
    pub code: TaskCode,
    /// Faction type this task is restricted to, if any.
    #[serde(default)]
    pub faction_code: Option<TypeCode>,
    /// Tooltip text.
    #[serde(default)]
    pub description: String,
    /// Icon reference for the task panel.
    #[serde(default)]
    pub icon: Option<String>,
    /// Task panel category.
    #[serde(default)]
    pub panel_category: u32,
    /// Behavior on completion.
    pub kind: TaskKind,
    /// Seconds the task occupies the head of the queue.
    #[serde(with = "fixed_decimal")]
    pub reload_time: Fixed,
    /// Resources debited on launch and refunded on cancel.
    #[serde(default)]
    pub cost: Vec<ResourceCost>,
    /// Disable after one launch on this launcher.
    #[serde(default)]
    pub use_once: bool,
    /// With `use_once`, disable for every launcher of the faction.
    #[serde(default)]
    pub use_once_on_all_instances: bool,
    /// Default availability; overridden by the task registry.
    #[serde(default = "default_available")]
    pub available: bool,
    /// Task codes enabled for the faction when this task completes.
    #[serde(default)]
    pub unlocks: Vec<TaskCode>,
    /// Kind-specific data.
    #[serde(default)]
    pub payload: TaskPayload,
}

const fn default_available() -> bool {
    true
}

impl TaskDefinition {
    /// Create a task of the given kind with no payload.
    #[must_use]
    pub fn new(code: impl Into<TaskCode>, kind: TaskKind, reload_time: Fixed) -> Self {
        Self {
            code: code.into(),
            faction_code: None,
            description: String::new(),
            icon: None,
            panel_category: 0,
            kind,
            reload_time,
            cost: Vec::new(),
            use_once: false,
            use_once_on_all_instances: false,
            available: true,
            unlocks: Vec::new(),
            payload: TaskPayload::None,
        }
    }

    /// Create a unit-creation task.
    #[must_use]
    pub fn create_unit(
        code: impl Into<TaskCode>,
        prefabs: Vec<UnitPrefab>,
        reload_time: Fixed,
    ) -> Self {
        let mut task = Self::new(code, TaskKind::CreateUnit, reload_time);
        task.payload = TaskPayload::CreateUnit { prefabs };
        task
    }

    /// Create a task that applies a unit upgrade on completion.
    #[must_use]
    pub fn unit_upgrade(code: impl Into<TaskCode>, upgrade: UpgradeId, reload_time: Fixed) -> Self {
        let mut task = Self::new(code, TaskKind::UnitUpgrade, reload_time);
        task.payload = TaskPayload::Upgrade(upgrade);
        task
    }

    /// Create a task that applies a building upgrade on completion.
    #[must_use]
    pub fn building_upgrade(
        code: impl Into<TaskCode>,
        upgrade: UpgradeId,
        reload_time: Fixed,
    ) -> Self {
        let mut task = Self::new(code, TaskKind::BuildingUpgrade, reload_time);
        task.payload = TaskPayload::Upgrade(upgrade);
        task
    }

    /// Set the resource cost.
    #[must_use]
    pub fn with_cost(mut self, cost: Vec<ResourceCost>) -> Self {
        self.cost = cost;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the task as single-use, optionally across all faction instances.
    #[must_use]
    pub const fn with_use_once(mut self, on_all_instances: bool) -> Self {
        self.use_once = true;
        self.use_once_on_all_instances = on_all_instances;
        self
    }

    /// Set the default availability.
    #[must_use]
    pub const fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Set the tasks unlocked on completion.
    #[must_use]
    pub fn with_unlocks(mut self, unlocks: Vec<TaskCode>) -> Self {
        self.unlocks = unlocks;
        self
    }

    /// Restrict the task to one faction type.
    #[must_use]
    pub fn with_faction_code(mut self, code: impl Into<TypeCode>) -> Self {
        self.faction_code = Some(code.into());
        self
    }

    /// Prefab set, for unit-creation tasks.
    #[must_use]
    pub fn prefabs(&self) -> Option<&[UnitPrefab]> {
        match &self.payload {
            TaskPayload::CreateUnit { prefabs } => Some(prefabs),
            _ => None,
        }
    }

    /// Code of the first prefab; identifies what a creation task produces.
    #[must_use]
    pub fn primary_unit(&self) -> Option<&TypeCode> {
        self.prefabs()
            .and_then(|prefabs| prefabs.first())
            .map(|prefab| &prefab.code)
    }

    /// Upgrade reference, for upgrade tasks.
    #[must_use]
    pub fn upgrade(&self) -> Option<&UpgradeId> {
        match &self.payload {
            TaskPayload::Upgrade(id) => Some(id),
            _ => None,
        }
    }

    /// Check that exactly the payload required by `kind` is present.
    pub fn validate(&self) -> Result<()> {
        let ok = match (self.kind, &self.payload) {
            (TaskKind::CreateUnit, TaskPayload::CreateUnit { prefabs }) => {
                !prefabs.is_empty() && prefabs.iter().any(|p| p.weight > 0)
            }
            (TaskKind::UnitUpgrade | TaskKind::BuildingUpgrade, TaskPayload::Upgrade(_)) => true,
            (
                TaskKind::CreateUnit | TaskKind::UnitUpgrade | TaskKind::BuildingUpgrade,
                _,
            ) => false,
            (_, TaskPayload::None) => true,
            (_, _) => false,
        };
        if ok && self.reload_time >= Fixed::ZERO {
            Ok(())
        } else {
            Err(ProductionError::DataParseError(format!(
                "task '{}' has a payload that does not match {:?}",
                self.code, self.kind
            )))
        }
    }

    /// Pick a prefab by weight.
    pub fn pick_prefab<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&UnitPrefab> {
        let prefabs = self.prefabs()?;
        let total: u64 = prefabs.iter().map(|p| u64::from(p.weight)).sum();
        if total == 0 {
            return prefabs.first();
        }
        let mut roll = rng.gen_range(0..total);
        for prefab in prefabs {
            let weight = u64::from(prefab.weight);
            if roll < weight {
                return Some(prefab);
            }
            roll -= weight;
        }
        prefabs.last()
    }
}

/// Ordered list of the tasks one launcher offers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskCatalog {
    tasks: Vec<TaskDefinition>,
}

impl TaskCatalog {
    /// Build a catalog, validating every task.
    pub fn new(tasks: Vec<TaskDefinition>) -> Result<Self> {
        for task in &tasks {
            task.validate()?;
        }
        Ok(Self { tasks })
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&TaskDefinition> {
        self.tasks.get(index)
    }

    /// Mutable task at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut TaskDefinition> {
        self.tasks.get_mut(index)
    }

    /// Index of the first task with this code.
    #[must_use]
    pub fn position(&self, code: &TaskCode) -> Option<usize> {
        self.tasks.iter().position(|task| &task.code == code)
    }

    /// Iterate tasks in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.iter()
    }

    /// Iterate tasks mutably in catalog order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TaskDefinition> {
        self.tasks.iter_mut()
    }

    /// Indices of tasks of a given kind.
    pub fn indices_of_kind(&self, kind: TaskKind) -> impl Iterator<Item = usize> + '_ {
        self.tasks
            .iter()
            .enumerate()
            .filter(move |(_, task)| task.kind == kind)
            .map(|(index, _)| index)
    }

    /// Drop tasks restricted to a faction type other than `faction_code`.
    ///
    /// Must only run before any queue entry refers into the catalog.
    pub fn retain_for_faction(&mut self, faction_code: Option<&TypeCode>) {
        self.tasks.retain(|task| match &task.faction_code {
            None => true,
            Some(code) => Some(code) == faction_code,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn secs(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_create_unit_validates() {
        let task = TaskDefinition::create_unit("train_militia", vec![UnitPrefab::new("militia")], secs(3));
        assert!(task.validate().is_ok());
        assert_eq!(task.primary_unit(), Some(&TypeCode::new("militia")));
    }

    #[test]
    fn test_missing_payload_rejected() {
        let task = TaskDefinition::new("train", TaskKind::CreateUnit, secs(3));
        assert!(task.validate().is_err());

        let task = TaskDefinition::new("upgrade", TaskKind::UnitUpgrade, secs(3));
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_stray_payload_rejected() {
        let mut task = TaskDefinition::new("self_destruct", TaskKind::Destroy, secs(1));
        task.payload = TaskPayload::Upgrade(UpgradeId::new("x"));
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_empty_prefab_set_rejected() {
        let task = TaskDefinition::create_unit("train", Vec::new(), secs(3));
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_catalog_rejects_invalid_task() {
        let result = TaskCatalog::new(vec![TaskDefinition::new(
            "broken",
            TaskKind::BuildingUpgrade,
            secs(1),
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn test_weighted_pick_respects_zero_weight() {
        let task = TaskDefinition::create_unit(
            "train",
            vec![
                UnitPrefab::new("never").with_weight(0),
                UnitPrefab::new("always").with_weight(5),
            ],
            secs(1),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..50 {
            assert_eq!(task.pick_prefab(&mut rng).unwrap().code.as_str(), "always");
        }
    }

    #[test]
    fn test_weighted_pick_covers_all_prefabs() {
        let task = TaskDefinition::create_unit(
            "train",
            vec![UnitPrefab::new("a"), UnitPrefab::new("b")],
            secs(1),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let picks: Vec<_> = (0..100)
            .map(|_| task.pick_prefab(&mut rng).unwrap().code.clone())
            .collect();
        assert!(picks.contains(&TypeCode::new("a")));
        assert!(picks.contains(&TypeCode::new("b")));
    }

    #[test]
    fn test_retain_for_faction() {
        let mut catalog = TaskCatalog::new(vec![
            TaskDefinition::new("shared", TaskKind::Custom, secs(1)),
            TaskDefinition::new("greek_only", TaskKind::Custom, secs(1)).with_faction_code("greek"),
            TaskDefinition::new("norse_only", TaskKind::Custom, secs(1)).with_faction_code("norse"),
        ])
        .unwrap();

        catalog.retain_for_faction(Some(&TypeCode::new("greek")));
        let codes: Vec<_> = catalog.iter().map(|t| t.code.0.as_str()).collect();
        assert_eq!(codes, vec!["shared", "greek_only"]);

        catalog.retain_for_faction(None);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_indices_of_kind() {
        let catalog = TaskCatalog::new(vec![
            TaskDefinition::new("a", TaskKind::Custom, secs(1)),
            TaskDefinition::unit_upgrade("b", UpgradeId::new("u"), secs(1)),
            TaskDefinition::unit_upgrade("c", UpgradeId::new("v"), secs(1)),
        ])
        .unwrap();
        let found: Vec<_> = catalog.indices_of_kind(TaskKind::UnitUpgrade).collect();
        assert_eq!(found, vec![1, 2]);
    }
}
