//! Automatic task launching for autonomous factions.
//!
//! One [`AutoProductionManager`] runs per autonomous faction and task kind.
//! It tracks every matching catalog entry on the faction's launchers and,
//! each time its randomized timer fires, asks the session to launch them.
//! Every request passes a policy gate and a random acceptance roll first.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::admission::AdmissionResult;
use crate::config::AutoProductionConfig;
use crate::error::Result;
use crate::factions::FactionId;
use crate::launcher::{LauncherId, TaskLauncher};
use crate::math::{unit_interval, Fixed};
use crate::snapshot::{ManagerSnapshot, RngState};
use crate::tasks::{TaskKind, TypeCode};
use crate::upgrades::{AppliedUpgrade, UpgradeBook};

/// Who is asking for a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestOrigin {
    /// The manager's own timer.
    Automatic,
    /// Another AI component.
    OnDemand,
}

/// Manager lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManagerState {
    /// Nothing to launch.
    Idle,
    /// At least one task is tracked.
    Armed,
}

/// A catalog entry the manager may launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedTask {
    /// Launcher offering the task.
    pub launcher: LauncherId,
    /// Catalog index.
    pub task: usize,
    /// Type replaced by the task's upgrade, if it launches one.
    pub source: Option<TypeCode>,
}

/// The manager's view of the session.
pub trait TaskPort {
    /// Kind of a catalog entry, if the launcher and entry exist.
    fn task_kind(&self, launcher: LauncherId, task: usize) -> Option<TaskKind>;

    /// Run a launch request through admission and, on success, enqueue it.
    ///
    /// # Errors
    ///
    /// Fails if the launcher or task no longer exists.
    fn launch(&mut self, launcher: LauncherId, task: usize) -> Result<AdmissionResult>;
}

/// Derive a manager's random stream from the session seed.
#[must_use]
pub fn stream_seed(seed: u64, faction: FactionId, kind: TaskKind) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (u64::from(faction.0) << 16)
        ^ (kind as u64)
}

/// Launches one task kind on behalf of an autonomous faction.
#[derive(Debug, Clone)]
pub struct AutoProductionManager {
    faction: FactionId,
    kind: TaskKind,
    config: AutoProductionConfig,
    state: ManagerState,
    tracked: Vec<TrackedTask>,
    timer: Fixed,
    rng: ChaCha8Rng,
}

impl AutoProductionManager {
    /// Create an idle manager with its first timer drawn.
    #[must_use]
    pub fn new(faction: FactionId, kind: TaskKind, config: AutoProductionConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(stream_seed(seed, faction, kind));
        let timer = config.reload_range.sample(&mut rng);
        Self {
            faction,
            kind,
            config,
            state: ManagerState::Idle,
            tracked: Vec::new(),
            timer,
            rng,
        }
    }

    /// Faction served.
    #[must_use]
    pub const fn faction(&self) -> FactionId {
        self.faction
    }

    /// Task kind launched.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ManagerState {
        self.state
    }

    /// Seconds until the next scan.
    #[must_use]
    pub const fn timer(&self) -> Fixed {
        self.timer
    }

    /// Tracked tasks in registration order.
    #[must_use]
    pub fn tracked(&self) -> &[TrackedTask] {
        &self.tracked
    }

    fn refresh_state(&mut self) {
        self.state = if self.tracked.is_empty() {
            ManagerState::Idle
        } else {
            ManagerState::Armed
        };
    }

    /// Track the launcher's entries of this manager's kind. Returns how many
    /// were added.
    pub fn on_launcher_added(&mut self, launcher: &TaskLauncher, book: &UpgradeBook) -> usize {
        if launcher.faction() != self.faction {
            return 0;
        }
        let before = self.tracked.len();
        for index in launcher.catalog().indices_of_kind(self.kind) {
            let source = launcher
                .catalog()
                .get(index)
                .and_then(|task| task.upgrade())
                .and_then(|id| book.get(id))
                .map(|upgrade| upgrade.source().clone());
            self.tracked.push(TrackedTask {
                launcher: launcher.id(),
                task: index,
                source,
            });
        }
        let added = self.tracked.len() - before;
        if added > 0 {
            debug!(faction = %self.faction, kind = ?self.kind, launcher = %launcher.id(), added, "Tracking tasks");
        }
        self.refresh_state();
        added
    }

    /// Capture timer, tracking and random stream position.
    #[must_use]
    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            faction: self.faction,
            kind: self.kind,
            timer: self.timer,
            tracked: self.tracked.clone(),
            rng: RngState::capture(&self.rng),
        }
    }

    /// Rebuild a manager from a snapshot under the given policy.
    #[must_use]
    pub fn from_snapshot(config: AutoProductionConfig, snapshot: ManagerSnapshot) -> Self {
        let mut manager = Self {
            faction: snapshot.faction,
            kind: snapshot.kind,
            config,
            state: ManagerState::Idle,
            tracked: snapshot.tracked,
            timer: snapshot.timer,
            rng: snapshot.rng.resume(),
        };
        manager.refresh_state();
        manager
    }

    /// Stop tracking a removed launcher.
    pub fn on_launcher_removed(&mut self, launcher: LauncherId) {
        self.tracked.retain(|tracked| tracked.launcher != launcher);
        self.refresh_state();
    }

    /// Stop tracking tasks made obsolete by an applied upgrade.
    pub fn on_upgrade_applied(&mut self, applied: &AppliedUpgrade) {
        if applied.kind.task_kind() != self.kind {
            return;
        }
        self.tracked
            .retain(|tracked| tracked.source.as_ref() != Some(&applied.source));
        self.refresh_state();
    }

    /// Count down and, when the timer fires, launch every tracked task.
    ///
    /// The timer only runs while the manager is armed with automatic
    /// launching on. Returns the number of successful launches.
    pub fn update(&mut self, dt: Fixed, port: &mut dyn TaskPort) -> usize {
        if self.state == ManagerState::Idle || !self.config.auto_launch {
            return 0;
        }
        self.timer -= dt;
        if self.timer > Fixed::ZERO {
            return 0;
        }
        self.timer = self.config.reload_range.sample(&mut self.rng);

        let kind = self.kind;
        self.tracked
            .retain(|tracked| port.task_kind(tracked.launcher, tracked.task) == Some(kind));
        self.refresh_state();
        if self.state == ManagerState::Idle {
            return 0;
        }

        let pending: Vec<(LauncherId, usize)> = self
            .tracked
            .iter()
            .map(|tracked| (tracked.launcher, tracked.task))
            .collect();
        let mut launched = 0;
        for (launcher, task) in pending {
            if self.request_launch(launcher, task, RequestOrigin::Automatic, port) {
                launched += 1;
            }
        }
        launched
    }

    /// Ask to launch a task. Returns whether it was enqueued.
    ///
    /// A request passes the policy flag for its origin, then a roll in
    /// `[0, 1)` that must not exceed a threshold drawn from the acceptance
    /// range. A rejected roll changes nothing.
    pub fn request_launch(
        &mut self,
        launcher: LauncherId,
        task: usize,
        origin: RequestOrigin,
        port: &mut dyn TaskPort,
    ) -> bool {
        let allowed = match origin {
            RequestOrigin::Automatic => self.config.auto_launch,
            RequestOrigin::OnDemand => self.config.on_demand,
        };
        if !allowed {
            return false;
        }

        let roll = unit_interval(&mut self.rng);
        let threshold = self.config.acceptance_range.sample(&mut self.rng);
        if roll > threshold {
            trace!(faction = %self.faction, %launcher, task, "Launch roll rejected");
            return false;
        }

        match port.launch(launcher, task) {
            Ok(result) => {
                debug!(faction = %self.faction, %launcher, task, ?origin, ?result, "Auto launch");
                result.is_success()
            }
            Err(err) => {
                debug!(faction = %self.faction, %launcher, task, %err, "Dropping stale task");
                self.tracked
                    .retain(|tracked| !(tracked.launcher == launcher && tracked.task == task));
                self.refresh_state();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::ProductionError;
    use crate::math::{FixedRange, Vec2Fixed};
    use crate::tasks::{TaskCatalog, TaskDefinition, UnitPrefab};
    use crate::upgrades::{UnitReplacement, UnitUpgrade, UpgradeDefinition, UpgradeId, UpgradeKind};
    use crate::world::Holder;

    const AI: FactionId = FactionId(2);

    /// Port that admits everything and records launches.
    #[derive(Default)]
    struct StubPort {
        kinds: BTreeMap<(LauncherId, usize), TaskKind>,
        launched: Vec<(LauncherId, usize)>,
        reply: Option<AdmissionResult>,
    }

    impl TaskPort for StubPort {
        fn task_kind(&self, launcher: LauncherId, task: usize) -> Option<TaskKind> {
            self.kinds.get(&(launcher, task)).copied()
        }

        fn launch(&mut self, launcher: LauncherId, task: usize) -> Result<AdmissionResult> {
            if !self.kinds.contains_key(&(launcher, task)) {
                return Err(ProductionError::LauncherNotFound(launcher));
            }
            self.launched.push((launcher, task));
            Ok(self.reply.unwrap_or(AdmissionResult::Success))
        }
    }

    fn book() -> UpgradeBook {
        UpgradeBook::new().with(UpgradeDefinition::Unit(UnitUpgrade {
            id: UpgradeId::new("pikes"),
            source: "spearman".into(),
            target: "pikeman".into(),
            replacement: UnitReplacement {
                description: String::new(),
                icon: None,
                reload_time: Fixed::from_num(5),
                cost: Vec::new(),
            },
            unit_triggers: Vec::new(),
            building_triggers: Vec::new(),
        }))
    }

    fn smithy(id: u32, faction: FactionId) -> TaskLauncher {
        let catalog = TaskCatalog::new(vec![
            TaskDefinition::create_unit("train", vec![UnitPrefab::new("spearman")], Fixed::from_num(3)),
            TaskDefinition::unit_upgrade("research_pikes", UpgradeId::new("pikes"), Fixed::from_num(20)),
        ])
        .unwrap();
        TaskLauncher::new(
            LauncherId(id),
            faction,
            Holder::building(u64::from(id), "smithy", 300, Vec2Fixed::ZERO),
            catalog,
        )
    }

    fn port_for(launchers: &[u32]) -> StubPort {
        let mut port = StubPort::default();
        for &id in launchers {
            port.kinds.insert((LauncherId(id), 0), TaskKind::CreateUnit);
            port.kinds.insert((LauncherId(id), 1), TaskKind::UnitUpgrade);
        }
        port
    }

    fn eager() -> AutoProductionManager {
        AutoProductionManager::new(
            AI,
            TaskKind::UnitUpgrade,
            AutoProductionConfig::eager(Fixed::ONE),
            7,
        )
    }

    #[test]
    fn test_tracks_matching_tasks_and_arms() {
        let mut manager = eager();
        assert_eq!(manager.state(), ManagerState::Idle);

        assert_eq!(manager.on_launcher_added(&smithy(1, AI), &book()), 1);
        assert_eq!(manager.state(), ManagerState::Armed);
        assert_eq!(manager.tracked()[0].task, 1);
        assert_eq!(manager.tracked()[0].source, Some(TypeCode::new("spearman")));

        assert_eq!(manager.on_launcher_added(&smithy(2, FactionId(1)), &book()), 0);
    }

    #[test]
    fn test_removal_returns_to_idle() {
        let mut manager = eager();
        manager.on_launcher_added(&smithy(1, AI), &book());
        manager.on_launcher_removed(LauncherId(1));
        assert_eq!(manager.state(), ManagerState::Idle);
        assert!(manager.tracked().is_empty());
    }

    #[test]
    fn test_timer_fires_and_launches_each_tracked_task() {
        let mut manager = eager();
        manager.on_launcher_added(&smithy(1, AI), &book());
        manager.on_launcher_added(&smithy(2, AI), &book());
        let mut port = port_for(&[1, 2]);

        let half = Fixed::ONE / Fixed::from_num(2);
        assert_eq!(manager.update(half, &mut port), 0);
        assert_eq!(manager.update(half, &mut port), 2);
        assert_eq!(port.launched, vec![(LauncherId(1), 1), (LauncherId(2), 1)]);
        assert_eq!(manager.timer(), Fixed::ONE);
    }

    #[test]
    fn test_auto_launch_flag_blocks_timer_launches() {
        let config = AutoProductionConfig {
            auto_launch: false,
            ..AutoProductionConfig::eager(Fixed::ONE)
        };
        let mut manager = AutoProductionManager::new(AI, TaskKind::UnitUpgrade, config, 1);
        manager.on_launcher_added(&smithy(1, AI), &book());
        let mut port = port_for(&[1]);

        assert_eq!(manager.update(Fixed::ONE, &mut port), 0);
        assert!(manager.request_launch(LauncherId(1), 1, RequestOrigin::OnDemand, &mut port));
        assert_eq!(port.launched.len(), 1);
    }

    #[test]
    fn test_timer_holds_while_idle_or_auto_off() {
        let mut port = port_for(&[1]);
        let mut idle = eager();
        let before = idle.snapshot();
        assert_eq!(idle.update(Fixed::from_num(5), &mut port), 0);
        assert_eq!(idle.snapshot(), before);

        let config = AutoProductionConfig {
            auto_launch: false,
            ..AutoProductionConfig::default()
        };
        let mut off = AutoProductionManager::new(AI, TaskKind::UnitUpgrade, config, 4);
        off.on_launcher_added(&smithy(1, AI), &book());
        let before = off.snapshot();
        for _ in 0..50 {
            off.update(Fixed::from_num(10), &mut port);
        }
        assert_eq!(off.snapshot(), before);
        assert!(port.launched.is_empty());
    }

    #[test]
    fn test_on_demand_flag() {
        let config = AutoProductionConfig {
            on_demand: false,
            ..AutoProductionConfig::eager(Fixed::ONE)
        };
        let mut manager = AutoProductionManager::new(AI, TaskKind::UnitUpgrade, config, 1);
        let mut port = port_for(&[1]);
        assert!(!manager.request_launch(LauncherId(1), 1, RequestOrigin::OnDemand, &mut port));
        assert!(port.launched.is_empty());
    }

    #[test]
    fn test_zero_acceptance_never_launches() {
        let config = AutoProductionConfig {
            acceptance_range: FixedRange::exactly(Fixed::ZERO),
            ..AutoProductionConfig::eager(Fixed::ONE)
        };
        let mut manager = AutoProductionManager::new(AI, TaskKind::UnitUpgrade, config, 3);
        let mut port = port_for(&[1]);
        let accepted = (0..200)
            .filter(|_| manager.request_launch(LauncherId(1), 1, RequestOrigin::OnDemand, &mut port))
            .count();
        // A roll of exactly zero is accepted; anything else is rejected.
        assert!(accepted <= 1);
        assert_eq!(port.launched.len(), accepted);
    }

    #[test]
    fn test_rejected_admission_reports_failure() {
        let mut manager = eager();
        let mut port = port_for(&[1]);
        port.reply = Some(AdmissionResult::LowResources);
        assert!(!manager.request_launch(LauncherId(1), 1, RequestOrigin::OnDemand, &mut port));
        assert_eq!(port.launched.len(), 1);
    }

    #[test]
    fn test_stale_tasks_dropped_on_scan() {
        let mut manager = eager();
        manager.on_launcher_added(&smithy(1, AI), &book());
        let mut port = port_for(&[1]);
        port.kinds.insert((LauncherId(1), 1), TaskKind::CreateUnit);

        assert_eq!(manager.update(Fixed::ONE, &mut port), 0);
        assert_eq!(manager.state(), ManagerState::Idle);
    }

    #[test]
    fn test_upgrade_applied_drops_same_source() {
        let mut manager = eager();
        manager.on_launcher_added(&smithy(1, AI), &book());

        let mut applied = AppliedUpgrade {
            id: UpgradeId::new("pikes"),
            kind: UpgradeKind::Building,
            source: "spearman".into(),
            target: "pikeman".into(),
        };
        manager.on_upgrade_applied(&applied);
        assert_eq!(manager.tracked().len(), 1);

        applied.kind = UpgradeKind::Unit;
        manager.on_upgrade_applied(&applied);
        assert_eq!(manager.state(), ManagerState::Idle);
    }

    #[test]
    fn test_same_seed_same_decisions() {
        let config = AutoProductionConfig::default();
        let run = || {
            let mut manager = AutoProductionManager::new(AI, TaskKind::UnitUpgrade, config, 99);
            let mut port = port_for(&[1]);
            (0..100)
                .map(|_| manager.request_launch(LauncherId(1), 1, RequestOrigin::OnDemand, &mut port))
                .collect::<Vec<_>>()
        };
        let first = run();
        assert_eq!(first, run());
        assert!(first.contains(&true));
        assert!(first.contains(&false));
    }

    #[test]
    fn test_snapshot_resumes_decisions() {
        let config = AutoProductionConfig::default();
        let mut manager = AutoProductionManager::new(AI, TaskKind::UnitUpgrade, config, 5);
        let mut port = port_for(&[1]);
        manager.on_launcher_added(&smithy(1, AI), &book());
        for _ in 0..10 {
            manager.request_launch(LauncherId(1), 1, RequestOrigin::OnDemand, &mut port);
        }

        let mut resumed = AutoProductionManager::from_snapshot(config, manager.snapshot());
        assert_eq!(resumed.state(), ManagerState::Armed);
        assert_eq!(resumed.timer(), manager.timer());
        for _ in 0..20 {
            assert_eq!(
                manager.request_launch(LauncherId(1), 1, RequestOrigin::OnDemand, &mut port),
                resumed.request_launch(LauncherId(1), 1, RequestOrigin::OnDemand, &mut port)
            );
        }
    }

    #[test]
    fn test_streams_differ_per_faction_and_kind() {
        assert_ne!(
            stream_seed(1, FactionId(1), TaskKind::UnitUpgrade),
            stream_seed(1, FactionId(2), TaskKind::UnitUpgrade)
        );
        assert_ne!(
            stream_seed(1, FactionId(1), TaskKind::UnitUpgrade),
            stream_seed(1, FactionId(1), TaskKind::BuildingUpgrade)
        );
    }
}
