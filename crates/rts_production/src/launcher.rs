//! Task launchers: the per-entity production queue.
//!
//! A launcher owns its catalog, a FIFO of pending entries and a countdown
//! timer for the head entry. It knows nothing about resources, registries or
//! upgrades; the session drives it and dispatches completions.
//!
//! Timer values are seconds in fixed-point so every client completes tasks
//! on the same tick.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::economy::ResourceCost;
use crate::error::Result;
use crate::factions::FactionId;
use crate::math::{fixed_serde, Fixed};
use crate::tasks::{TaskCatalog, TaskDefinition, TaskKind, TypeCode};
use crate::world::{Holder, Liveness};

/// Unique identifier for launchers within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LauncherId(pub u32);

impl fmt::Display for LauncherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pending task: an index into the owning launcher's catalog plus what
/// the launch reserved.
///
/// Upgrades may rewrite the catalog entry while it waits, so a cancel
/// refunds and releases from the reservation, never from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Catalog index.
    pub task: usize,
    /// Resources debited at launch.
    #[serde(default)]
    pub charged: Vec<ResourceCost>,
    /// Whether the launch took a population slot.
    #[serde(default)]
    pub holds_slot: bool,
    /// Unit type whose limit counter the launch incremented.
    #[serde(default)]
    pub limited_unit: Option<TypeCode>,
}

impl QueueEntry {
    /// An entry that reserved nothing.
    #[must_use]
    pub const fn new(task: usize) -> Self {
        Self {
            task,
            charged: Vec::new(),
            holds_slot: false,
            limited_unit: None,
        }
    }

    /// Entry reserving exactly what `definition` asks for today.
    #[must_use]
    pub fn reserving(task: usize, definition: &TaskDefinition) -> Self {
        let creates_unit = definition.kind == TaskKind::CreateUnit;
        Self {
            task,
            charged: definition.cost.clone(),
            holds_slot: creates_unit,
            limited_unit: if creates_unit {
                definition.primary_unit().cloned()
            } else {
                None
            },
        }
    }
}

/// Data-driven launcher definition.
///
/// # Example RON
///
/// ```ron
/// LauncherTemplate(
///     code: "barracks",
///     min_task_health: 70,
///     max_tasks: 4,
///     tasks: [
///         TaskDefinition(code: "train_spearman", kind: CreateUnit, reload_time: 5.0,
///             payload: CreateUnit(prefabs: [UnitPrefab(code: "spearman")])),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherTemplate {
    /// Holder type this template is attached to.
    pub code: String,
    /// Minimum holder health to launch or advance tasks.
    #[serde(default = "default_min_task_health")]
    pub min_task_health: i32,
    /// Maximum queue length.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
    /// Offered tasks, in panel order.
    pub tasks: Vec<TaskDefinition>,
}

const fn default_min_task_health() -> i32 {
    TaskLauncher::DEFAULT_MIN_TASK_HEALTH
}

const fn default_max_tasks() -> usize {
    TaskLauncher::DEFAULT_MAX_TASKS
}

/// Production queue attached to one unit or building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLauncher {
    id: LauncherId,
    code: String,
    faction: FactionId,
    holder: Holder,
    catalog: TaskCatalog,
    queue: VecDeque<QueueEntry>,
    #[serde(with = "fixed_serde")]
    timer: Fixed,
    min_task_health: i32,
    max_tasks: usize,
}

impl TaskLauncher {
    /// Default minimum holder health.
    pub const DEFAULT_MIN_TASK_HEALTH: i32 = 70;

    /// Default maximum queue length.
    pub const DEFAULT_MAX_TASKS: usize = 4;

    /// Create a launcher with an empty queue.
    #[must_use]
    pub fn new(id: LauncherId, faction: FactionId, holder: Holder, catalog: TaskCatalog) -> Self {
        Self {
            id,
            code: String::new(),
            faction,
            holder,
            catalog,
            queue: VecDeque::new(),
            timer: Fixed::ZERO,
            min_task_health: Self::DEFAULT_MIN_TASK_HEALTH,
            max_tasks: Self::DEFAULT_MAX_TASKS,
        }
    }

    /// Create a launcher from a template.
    pub fn from_template(
        id: LauncherId,
        faction: FactionId,
        holder: Holder,
        template: &LauncherTemplate,
    ) -> Result<Self> {
        let catalog = TaskCatalog::new(template.tasks.clone())?;
        let mut launcher = Self::new(id, faction, holder, catalog)
            .with_min_task_health(template.min_task_health)
            .with_max_tasks(template.max_tasks);
        launcher.code.clone_from(&template.code);
        Ok(launcher)
    }

    /// Set the minimum holder health.
    #[must_use]
    pub const fn with_min_task_health(mut self, health: i32) -> Self {
        self.min_task_health = health;
        self
    }

    /// Set the maximum queue length.
    #[must_use]
    pub const fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    /// Launcher ID.
    #[must_use]
    pub const fn id(&self) -> LauncherId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: LauncherId) {
        self.id = id;
    }

    /// Code of the template the launcher was built from, if any.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Owning faction.
    #[must_use]
    pub const fn faction(&self) -> FactionId {
        self.faction
    }

    /// The entity holding this launcher.
    #[must_use]
    pub const fn holder(&self) -> &Holder {
        &self.holder
    }

    /// Mutable holder state (health, construction, death).
    pub fn holder_mut(&mut self) -> &mut Holder {
        &mut self.holder
    }

    /// Offered tasks.
    #[must_use]
    pub const fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    /// Mutable catalog; queue entries keep their indices.
    pub fn catalog_mut(&mut self) -> &mut TaskCatalog {
        &mut self.catalog
    }

    /// Minimum holder health to operate.
    #[must_use]
    pub const fn min_task_health(&self) -> i32 {
        self.min_task_health
    }

    /// Maximum queue length.
    #[must_use]
    pub const fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    /// Seconds left on the head entry.
    #[must_use]
    pub const fn timer(&self) -> Fixed {
        self.timer
    }

    /// Pending entries, head first.
    pub fn queue(&self) -> impl Iterator<Item = &QueueEntry> {
        self.queue.iter()
    }

    /// Number of pending entries.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue has reached `max_tasks`.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.max_tasks
    }

    /// Entry at a queue position.
    #[must_use]
    pub fn entry(&self, index: usize) -> Option<&QueueEntry> {
        self.queue.get(index)
    }

    /// Holder health.
    #[must_use]
    pub const fn holder_health(&self) -> i32 {
        self.holder.health()
    }

    /// Whether the holder is alive (or built and standing) with enough health.
    #[must_use]
    pub fn can_operate(&self) -> bool {
        matches!(self.holder.liveness(), Liveness::Alive)
            && self.holder.health() >= self.min_task_health
    }

    fn reload_of(&self, entry: Option<&QueueEntry>) -> Fixed {
        entry
            .and_then(|entry| self.catalog.get(entry.task))
            .map_or(Fixed::ZERO, |task| task.reload_time)
    }

    /// Append an entry. Starts the timer when the queue was empty.
    pub(crate) fn push(&mut self, entry: QueueEntry) {
        self.queue.push_back(entry);
        if self.queue.len() == 1 {
            self.timer = self.reload_of(self.queue.front());
        }
    }

    /// Count down the head entry.
    ///
    /// Returns the catalog index of the entry that completed this tick, if
    /// any. The timer does not move while the holder cannot operate.
    pub fn advance(&mut self, dt: Fixed) -> Option<usize> {
        if self.queue.is_empty() || !self.can_operate() {
            return None;
        }

        self.timer -= dt;
        if self.timer > Fixed::ZERO {
            return None;
        }

        let completed = self.queue.pop_front()?;
        self.timer = self.reload_of(self.queue.front());
        Some(completed.task)
    }

    /// Remove the entry at `index`.
    ///
    /// Removing the head restarts the timer for the new head; removing any
    /// other entry leaves the head's countdown untouched.
    pub(crate) fn remove(&mut self, index: usize) -> Option<QueueEntry> {
        let removed = self.queue.remove(index)?;
        if index == 0 {
            self.timer = self.reload_of(self.queue.front());
        }
        Some(removed)
    }

    /// Discard every pending entry.
    pub(crate) fn clear(&mut self) -> Vec<QueueEntry> {
        self.timer = Fixed::ZERO;
        self.queue.drain(..).collect()
    }
}
