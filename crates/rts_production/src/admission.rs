//! Admission control for task launch requests.
//!
//! Checks run in a fixed order and the first failure wins. Evaluation has no
//! side effects; the session debits, enqueues and counts population only
//! after a [`AdmissionResult::Success`].

use serde::{Deserialize, Serialize};

use crate::economy::ResourceLedger;
use crate::launcher::TaskLauncher;
use crate::population::PopulationLedger;
use crate::registry::TaskRegistry;
use crate::tasks::{TaskDefinition, TaskKind};
use crate::world::Liveness;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdmissionResult {
    /// The task may be enqueued.
    Success,
    /// The task is disabled for this faction or launcher.
    Disabled,
    /// The holding building is still under construction.
    NotBuilt,
    /// The holder is dead or destroyed.
    Destroyed,
    /// The holder's health is below the launcher's threshold.
    LowHealth,
    /// The queue is full.
    MaxTasksReached,
    /// The faction cannot pay the task cost.
    LowResources,
    /// No free population slot, or the faction reached its limit for the
    /// unit type.
    MaxPopulationReached,
}

impl AdmissionResult {
    /// Whether the request was admitted.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Message shown to the local player on rejection.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Success => "",
            Self::Disabled => "This task is not available.",
            Self::NotBuilt => "The building must be constructed first.",
            Self::Destroyed => "The task holder no longer exists.",
            Self::LowHealth => "Health is too low to launch this task.",
            Self::MaxTasksReached => "The task queue is full.",
            Self::LowResources => "Not enough resources.",
            Self::MaxPopulationReached => "Maximum population reached.",
        }
    }
}

/// Decide whether `task` may be enqueued on `launcher`.
pub fn evaluate(
    launcher: &TaskLauncher,
    task: &TaskDefinition,
    registry: &TaskRegistry,
    ledger: &dyn ResourceLedger,
    population: &dyn PopulationLedger,
) -> AdmissionResult {
    let faction = launcher.faction();

    if !registry.is_enabled(&task.code, faction, task.available) {
        return AdmissionResult::Disabled;
    }

    match launcher.holder().liveness() {
        Liveness::Destroyed => return AdmissionResult::Destroyed,
        Liveness::NotBuilt => return AdmissionResult::NotBuilt,
        Liveness::Alive => {}
    }

    if launcher.holder_health() < launcher.min_task_health() {
        return AdmissionResult::LowHealth;
    }

    if launcher.is_full() {
        return AdmissionResult::MaxTasksReached;
    }

    if !ledger.can_afford(&task.cost, faction) {
        return AdmissionResult::LowResources;
    }

    if task.kind == TaskKind::CreateUnit {
        let full = population.current_population(faction) >= population.max_population(faction);
        let limited = task
            .primary_unit()
            .is_some_and(|unit| population.has_reached_type_limit(faction, unit));
        if full || limited {
            return AdmissionResult::MaxPopulationReached;
        }
    }

    AdmissionResult::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::{ResourceCost, Stockpile};
    use crate::factions::FactionId;
    use crate::launcher::{LauncherId, QueueEntry};
    use crate::math::{Fixed, Vec2Fixed};
    use crate::population::PopulationCounter;
    use crate::tasks::{TaskCatalog, TypeCode, UnitPrefab};
    use crate::world::Holder;

    const RED: FactionId = FactionId(1);

    struct Fixture {
        launcher: TaskLauncher,
        registry: TaskRegistry,
        stockpile: Stockpile,
        population: PopulationCounter,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = TaskCatalog::new(vec![TaskDefinition::create_unit(
                "train_archer",
                vec![UnitPrefab::new("archer")],
                Fixed::from_num(5),
            )
            .with_cost(vec![ResourceCost::new("wood", 40)])])
            .unwrap();
            let launcher = TaskLauncher::new(
                LauncherId(1),
                RED,
                Holder::building(1, "range", 300, Vec2Fixed::ZERO),
                catalog,
            );
            let mut population = PopulationCounter::new();
            population.set_max(RED, 10);
            Self {
                launcher,
                registry: TaskRegistry::new(),
                stockpile: Stockpile::new().with(RED, "wood", 100),
                population,
            }
        }

        fn evaluate(&self) -> AdmissionResult {
            let task = self.launcher.catalog().get(0).unwrap();
            evaluate(
                &self.launcher,
                task,
                &self.registry,
                &self.stockpile,
                &self.population,
            )
        }
    }

    #[test]
    fn test_success() {
        assert_eq!(Fixture::new().evaluate(), AdmissionResult::Success);
    }

    #[test]
    fn test_disabled_wins_over_everything() {
        let mut fx = Fixture::new();
        fx.registry
            .set_enabled(&"train_archer".into(), RED, false);
        fx.stockpile.set(RED, "wood", 0);
        fx.launcher.holder_mut().set_health(1);
        fx.population.set_max(RED, 0);
        assert_eq!(fx.evaluate(), AdmissionResult::Disabled);
    }

    #[test]
    fn test_default_availability_used_without_record() {
        let mut fx = Fixture::new();
        fx.launcher.catalog_mut().get_mut(0).unwrap().available = false;
        assert_eq!(fx.evaluate(), AdmissionResult::Disabled);

        fx.registry.set_enabled(&"train_archer".into(), RED, true);
        assert_eq!(fx.evaluate(), AdmissionResult::Success);
    }

    #[test]
    fn test_destroyed_before_health() {
        let mut fx = Fixture::new();
        fx.launcher.holder_mut().set_health(0);
        fx.launcher.holder_mut().mark_destroyed();
        assert_eq!(fx.evaluate(), AdmissionResult::Destroyed);
    }

    #[test]
    fn test_not_built() {
        let mut fx = Fixture::new();
        if let Holder::Building(building) = fx.launcher.holder_mut() {
            building.is_built = false;
        }
        assert_eq!(fx.evaluate(), AdmissionResult::NotBuilt);
    }

    #[test]
    fn test_low_health() {
        let mut fx = Fixture::new();
        fx.launcher.holder_mut().set_health(TaskLauncher::DEFAULT_MIN_TASK_HEALTH - 1);
        assert_eq!(fx.evaluate(), AdmissionResult::LowHealth);
    }

    #[test]
    fn test_full_queue_before_resources() {
        let mut fx = Fixture::new();
        fx.launcher = fx.launcher.clone().with_max_tasks(1);
        fx.launcher.push(QueueEntry::new(0));
        fx.stockpile.set(RED, "wood", 0);
        assert_eq!(fx.evaluate(), AdmissionResult::MaxTasksReached);
    }

    #[test]
    fn test_low_resources_before_population() {
        let mut fx = Fixture::new();
        fx.stockpile.set(RED, "wood", 39);
        fx.population.set_max(RED, 0);
        assert_eq!(fx.evaluate(), AdmissionResult::LowResources);
    }

    #[test]
    fn test_type_limit_reports_population() {
        let mut fx = Fixture::new();
        fx.population.set_type_limit(RED, "archer", 0);
        assert_eq!(fx.evaluate(), AdmissionResult::MaxPopulationReached);

        fx.population.set_type_limit(RED, "archer", 1);
        assert_eq!(fx.evaluate(), AdmissionResult::Success);

        fx.population.set_max(RED, 0);
        assert_eq!(fx.evaluate(), AdmissionResult::MaxPopulationReached);
    }

    #[test]
    fn test_population_ignored_for_other_kinds() {
        let mut fx = Fixture::new();
        let task = fx.launcher.catalog_mut().get_mut(0).unwrap();
        *task = TaskDefinition::new("research", TaskKind::Custom, Fixed::from_num(1));
        fx.population.set_max(RED, 0);
        fx.population
            .set_type_limit(RED, TypeCode::new("archer"), 0);
        assert_eq!(fx.evaluate(), AdmissionResult::Success);
    }

    #[test]
    fn test_messages() {
        assert!(AdmissionResult::Success.message().is_empty());
        assert_eq!(AdmissionResult::LowResources.message(), "Not enough resources.");
        assert!(!AdmissionResult::MaxPopulationReached.is_success());
    }
}
