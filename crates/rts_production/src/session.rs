//! The production session: one match's worth of launchers, registry,
//! upgrades and autonomous managers.
//!
//! All mutation goes through the session, one operation at a time. Each
//! launch or cancel applies its admission check, ledger change, population
//! change and queue change together before returning. Launchers are
//! processed in ascending ID order every tick.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::admission::{self, AdmissionResult};
use crate::ai::production::{AutoProductionManager, RequestOrigin, TaskPort};
use crate::config::{SessionConfig, SessionMode};
use crate::data::ProductionData;
use crate::error::{ProductionError, Result};
use crate::events::{EventBus, ProductionEvent, SubscriberId};
use crate::factions::{FactionId, FactionProfile};
use crate::feedback::AudioCue;
use crate::host::{Host, SandboxHost};
use crate::launcher::{LauncherId, LauncherTemplate, QueueEntry, TaskLauncher};
use crate::math::{Fixed, Vec2Fixed};
use crate::registry::TaskRegistry;
use crate::snapshot::{RngState, SessionSnapshot};
use crate::tasks::{TaskCode, TaskDefinition, TaskKind, TypeCode};
use crate::upgrades::{UpgradeBook, UpgradeContext, UpgradeCoordinator, UpgradeId, UpgradeOutcome};
use crate::world::{BuildingHolder, EntityId, Holder, PlacedBuilding, PlacementCatalog};

/// A request against a launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRequest {
    /// Enqueue the catalog entry at this index.
    Launch(usize),
    /// Cancel the pending entry at this queue position immediately.
    CancelPending {
        /// Queue position.
        queue_index: usize,
    },
}

/// Production state for one match.
pub struct Session<H: Host = SandboxHost> {
    config: SessionConfig,
    tick: u64,
    factions: BTreeMap<FactionId, FactionProfile>,
    launchers: BTreeMap<LauncherId, TaskLauncher>,
    next_launcher: u32,
    registry: TaskRegistry,
    coordinator: UpgradeCoordinator,
    buildings: BTreeMap<EntityId, PlacedBuilding>,
    placement: PlacementCatalog,
    templates: BTreeMap<TypeCode, LauncherTemplate>,
    events: EventBus,
    managers: Vec<AutoProductionManager>,
    rng: ChaCha8Rng,
    host: H,
}

impl Session<SandboxHost> {
    /// Create a session backed by in-memory collaborators.
    #[must_use]
    pub fn sandbox(config: SessionConfig) -> Self {
        Self::new(config, SandboxHost::new())
    }
}

impl<H: Host> Session<H> {
    /// Create an empty session.
    #[must_use]
    pub fn new(config: SessionConfig, host: H) -> Self {
        Self {
            config,
            tick: 0,
            factions: BTreeMap::new(),
            launchers: BTreeMap::new(),
            next_launcher: 1,
            registry: TaskRegistry::new(),
            coordinator: UpgradeCoordinator::default(),
            buildings: BTreeMap::new(),
            placement: PlacementCatalog::new(),
            templates: BTreeMap::new(),
            events: EventBus::new(),
            managers: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            host,
        }
    }

    /// Use an upgrade book.
    #[must_use]
    pub fn with_upgrades(mut self, book: UpgradeBook) -> Self {
        *self.coordinator.book_mut() = book;
        self
    }

    /// Load launcher templates and upgrades.
    pub fn load_data(&mut self, data: &ProductionData) {
        *self.coordinator.book_mut() = data.upgrade_book();
        for template in &data.launchers {
            self.add_template(template.clone());
        }
    }

    /// Register a launcher template for a holder type.
    pub fn add_template(&mut self, template: LauncherTemplate) {
        self.templates
            .insert(TypeCode::new(template.code.clone()), template);
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Ticks simulated so far.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// External collaborators.
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Mutable external collaborators.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Availability overrides.
    #[must_use]
    pub const fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Upgrade book and applied upgrade records.
    #[must_use]
    pub const fn coordinator(&self) -> &UpgradeCoordinator {
        &self.coordinator
    }

    /// Autonomous production managers.
    #[must_use]
    pub fn managers(&self) -> &[AutoProductionManager] {
        &self.managers
    }

    /// Placement menus.
    #[must_use]
    pub const fn placement(&self) -> &PlacementCatalog {
        &self.placement
    }

    /// Set a faction's placement menu.
    pub fn set_placement(&mut self, faction: FactionId, codes: Vec<TypeCode>) {
        self.placement.set(faction, codes);
    }

    /// Subscribe to production events.
    pub fn subscribe(&mut self) -> SubscriberId {
        self.events.subscribe()
    }

    /// Take a subscriber's pending events.
    pub fn drain_events(&mut self, subscriber: SubscriberId) -> Vec<ProductionEvent> {
        self.events.drain(subscriber)
    }

    /// Take events published outside [`tick`](Self::tick), such as launches
    /// and cancels requested between ticks.
    pub fn take_events(&mut self) -> Vec<ProductionEvent> {
        self.events.take_current()
    }

    // --- factions -----------------------------------------------------------

    /// Register a faction. Autonomous factions get unit and building upgrade
    /// managers.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::InvalidState`] if the faction is already
    /// registered.
    pub fn add_faction(&mut self, profile: FactionProfile) -> Result<()> {
        let id = profile.id;
        if self.factions.contains_key(&id) {
            return Err(ProductionError::InvalidState(format!(
                "faction {id} registered twice"
            )));
        }
        let autonomous = profile.is_autonomous();
        self.factions.insert(id, profile);
        if autonomous {
            self.add_manager(id, TaskKind::UnitUpgrade)?;
            self.add_manager(id, TaskKind::BuildingUpgrade)?;
        }
        debug!(faction = %id, autonomous, "Faction registered");
        Ok(())
    }

    /// Registered faction.
    #[must_use]
    pub fn faction(&self, id: FactionId) -> Option<&FactionProfile> {
        self.factions.get(&id)
    }

    fn is_local_player(&self, faction: FactionId) -> bool {
        self.factions
            .get(&faction)
            .is_some_and(FactionProfile::is_local_player)
    }

    /// Add an automatic production manager for a faction and task kind.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::UnknownFaction`] for unregistered factions.
    pub fn add_manager(&mut self, faction: FactionId, kind: TaskKind) -> Result<()> {
        if !self.factions.contains_key(&faction) {
            return Err(ProductionError::UnknownFaction(faction));
        }
        let mut manager = AutoProductionManager::new(
            faction,
            kind,
            self.config.auto_production,
            self.config.seed,
        );
        for launcher in self.launchers.values() {
            manager.on_launcher_added(launcher, self.coordinator.book());
        }
        self.managers.push(manager);
        Ok(())
    }

    // --- buildings ----------------------------------------------------------

    /// Add a standing building to the roster.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::UnknownFaction`] for unregistered factions.
    pub fn add_building(&mut self, building: PlacedBuilding) -> Result<()> {
        if !self.factions.contains_key(&building.faction) {
            return Err(ProductionError::UnknownFaction(building.faction));
        }
        self.buildings.insert(building.entity, building);
        Ok(())
    }

    /// Remove a building and every launcher it holds.
    pub fn remove_building(&mut self, entity: EntityId) -> Option<PlacedBuilding> {
        let removed = self.buildings.remove(&entity);
        for id in self.launchers_held_by(entity) {
            // The ID came from the map a moment ago.
            let _ = self.remove_launcher(id);
        }
        removed
    }

    /// Standing buildings in entity order.
    pub fn buildings(&self) -> impl Iterator<Item = &PlacedBuilding> {
        self.buildings.values()
    }

    fn launchers_held_by(&self, entity: EntityId) -> Vec<LauncherId> {
        self.launchers
            .values()
            .filter(|launcher| launcher.holder().entity() == entity)
            .map(TaskLauncher::id)
            .collect()
    }

    // --- launchers ----------------------------------------------------------

    /// Register a launcher whose holder has finished spawning.
    ///
    /// Tasks restricted to other faction types are dropped, availability is
    /// initialized from the registry and every recorded unit upgrade of the
    /// faction is applied to the catalog. The launcher's own ID is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::UnknownFaction`] for unregistered factions.
    pub fn register_launcher(&mut self, mut launcher: TaskLauncher) -> Result<LauncherId> {
        let faction = launcher.faction();
        let profile = self
            .factions
            .get(&faction)
            .ok_or(ProductionError::UnknownFaction(faction))?;

        let id = LauncherId(self.next_launcher);
        self.next_launcher += 1;
        launcher.set_id(id);

        launcher
            .catalog_mut()
            .retain_for_faction(profile.type_code.as_ref());
        for task in launcher.catalog_mut().iter_mut() {
            task.available = self
                .registry
                .is_enabled(&task.code, faction, task.available);
        }
        let replayed = self.coordinator.replay(&mut launcher);

        if let Holder::Building(building) = launcher.holder() {
            self.buildings
                .entry(building.entity)
                .or_insert_with(|| PlacedBuilding {
                    entity: building.entity,
                    code: building.code.clone(),
                    faction,
                    health: building.health,
                    position: building.position,
                    territory: building.territory,
                });
        }

        for manager in &mut self.managers {
            manager.on_launcher_added(&launcher, self.coordinator.book());
        }
        debug!(
            launcher = %id,
            %faction,
            tasks = launcher.catalog().len(),
            replayed,
            "Launcher registered"
        );
        self.launchers.insert(id, launcher);
        self.events
            .publish(ProductionEvent::LauncherAdded { launcher: id, faction });
        Ok(id)
    }

    /// Build a launcher from the template for the holder's type and register it.
    ///
    /// # Errors
    ///
    /// Fails if there is no template for the holder type, the template's
    /// tasks are invalid or the faction is unknown.
    pub fn spawn_launcher(&mut self, faction: FactionId, holder: Holder) -> Result<LauncherId> {
        let template = self.templates.get(holder.code()).ok_or_else(|| {
            ProductionError::InvalidState(format!("no launcher template for '{}'", holder.code()))
        })?;
        let launcher = TaskLauncher::from_template(LauncherId(0), faction, holder, template)?;
        self.register_launcher(launcher)
    }

    /// Remove a launcher. Pending entries are discarded without refund.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::LauncherNotFound`] for unknown IDs.
    pub fn remove_launcher(&mut self, id: LauncherId) -> Result<TaskLauncher> {
        let mut launcher = self
            .launchers
            .remove(&id)
            .ok_or(ProductionError::LauncherNotFound(id))?;
        let discarded = launcher.clear().len();
        for manager in &mut self.managers {
            manager.on_launcher_removed(id);
        }
        debug!(launcher = %id, discarded, "Launcher removed");
        self.events.publish(ProductionEvent::LauncherRemoved {
            launcher: id,
            faction: launcher.faction(),
            discarded,
        });
        Ok(launcher)
    }

    /// A registered launcher.
    #[must_use]
    pub fn launcher(&self, id: LauncherId) -> Option<&TaskLauncher> {
        self.launchers.get(&id)
    }

    /// Registered launchers in ID order.
    pub fn launchers(&self) -> impl Iterator<Item = &TaskLauncher> {
        self.launchers.values()
    }

    fn launcher_ref(&self, id: LauncherId) -> Result<&TaskLauncher> {
        self.launchers
            .get(&id)
            .ok_or(ProductionError::LauncherNotFound(id))
    }

    /// Mutable holder of a launcher, for health and construction updates.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::LauncherNotFound`] for unknown IDs.
    pub fn holder_mut(&mut self, id: LauncherId) -> Result<&mut Holder> {
        self.launchers
            .get_mut(&id)
            .map(TaskLauncher::holder_mut)
            .ok_or(ProductionError::LauncherNotFound(id))
    }

    /// Set a launcher holder's health.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::LauncherNotFound`] for unknown IDs.
    pub fn set_health(&mut self, id: LauncherId, health: i32) -> Result<()> {
        self.holder_mut(id)?.set_health(health);
        Ok(())
    }

    // --- tasks --------------------------------------------------------------

    /// Whether a catalog entry is currently enabled for its launcher.
    ///
    /// # Errors
    ///
    /// Fails for unknown launchers or catalog indices.
    pub fn is_task_enabled(&self, id: LauncherId, task: usize) -> Result<bool> {
        let launcher = self.launcher_ref(id)?;
        let definition = launcher
            .catalog()
            .get(task)
            .ok_or(ProductionError::TaskNotFound { launcher: id, index: task })?;
        Ok(self
            .registry
            .is_enabled(&definition.code, launcher.faction(), definition.available))
    }

    /// Enable or disable a task for every launcher of a faction.
    pub fn set_task_enabled(&mut self, code: &TaskCode, faction: FactionId, enabled: bool) {
        self.registry.set_enabled(code, faction, enabled);
    }

    /// Enqueue a catalog entry. Shorthand for [`TaskRequest::Launch`].
    ///
    /// # Errors
    ///
    /// Fails for unknown launchers or catalog indices. Admission failures
    /// are returned as `Ok` results.
    pub fn launch(&mut self, id: LauncherId, task: usize) -> Result<AdmissionResult> {
        self.request(id, TaskRequest::Launch(task))
    }

    /// Handle a request against a launcher.
    ///
    /// A launched `CancelPending` catalog entry cancels the newest pending
    /// entry. Cancel requests always report success.
    ///
    /// # Errors
    ///
    /// Fails for unknown launchers or catalog indices. Admission failures
    /// are returned as `Ok` results.
    pub fn request(&mut self, id: LauncherId, request: TaskRequest) -> Result<AdmissionResult> {
        let index = match request {
            TaskRequest::CancelPending { queue_index } => {
                self.cancel(id, queue_index)?;
                return Ok(AdmissionResult::Success);
            }
            TaskRequest::Launch(index) => index,
        };

        let launcher = self.launcher_ref(id)?;
        let task = launcher
            .catalog()
            .get(index)
            .ok_or(ProductionError::TaskNotFound { launcher: id, index })?;

        if task.kind == TaskKind::CancelPending {
            if let Some(newest) = launcher.queue_len().checked_sub(1) {
                self.cancel(id, newest)?;
            }
            return Ok(AdmissionResult::Success);
        }

        let faction = launcher.faction();
        let entity = launcher.holder().entity();
        let result = admission::evaluate(
            launcher,
            task,
            &self.registry,
            self.host.ledger(),
            self.host.population(),
        );

        if !result.is_success() {
            debug!(launcher = %id, task = %task.code, ?result, "Launch rejected");
            if self.is_local_player(faction) {
                let feedback = self.host.feedback();
                feedback.show_message(result.message());
                feedback.play_cue(AudioCue::TaskDeclined, Some(entity));
            }
            return Ok(result);
        }

        let task = task.clone();
        self.enqueue(id, index, &task)?;
        Ok(AdmissionResult::Success)
    }

    fn enqueue(&mut self, id: LauncherId, index: usize, task: &TaskDefinition) -> Result<()> {
        let local = self.is_local_player(
            self.launcher_ref(id)?.faction(),
        );
        let launcher = self
            .launchers
            .get_mut(&id)
            .ok_or(ProductionError::LauncherNotFound(id))?;
        let faction = launcher.faction();
        let entity = launcher.holder().entity();

        let entry = QueueEntry::reserving(index, task);
        if entry.holds_slot {
            let population = self.host.population_mut();
            population.adjust_population(faction, 1);
            if let Some(unit) = &entry.limited_unit {
                population.adjust_type_limit(faction, unit, true);
            }
        }

        launcher.push(entry);
        let queue_pos = launcher.queue_len() - 1;

        if task.use_once {
            if let Some(definition) = launcher.catalog_mut().get_mut(index) {
                definition.available = false;
            }
            if task.use_once_on_all_instances {
                self.registry.set_enabled(&task.code, faction, false);
            }
        }

        self.host.ledger_mut().debit(&task.cost, faction);

        debug!(launcher = %id, task = %task.code, queue_pos, "Task launched");
        self.events.publish(ProductionEvent::TaskLaunched {
            launcher: id,
            task: index,
            code: task.code.clone(),
            queue_pos,
        });
        if local {
            self.host
                .feedback()
                .play_cue(AudioCue::TaskLaunched, Some(entity));
        }
        Ok(())
    }

    /// Cancel a pending entry, refunding what its launch charged.
    ///
    /// The refund and population release come from the entry's own
    /// reservation, so an upgrade that rewrote the task while it waited
    /// does not change them.
    ///
    /// Returns `false` without side effects if `queue_index` is out of range.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::LauncherNotFound`] for unknown IDs.
    pub fn cancel(&mut self, id: LauncherId, queue_index: usize) -> Result<bool> {
        let launcher = self
            .launchers
            .get_mut(&id)
            .ok_or(ProductionError::LauncherNotFound(id))?;
        let Some(entry) = launcher.remove(queue_index) else {
            return Ok(false);
        };
        let faction = launcher.faction();
        let task = launcher.catalog().get(entry.task).cloned();

        self.host.ledger_mut().credit(&entry.charged, faction);
        if entry.holds_slot {
            let population = self.host.population_mut();
            population.adjust_population(faction, -1);
            if let Some(unit) = &entry.limited_unit {
                population.adjust_type_limit(faction, unit, false);
            }
        }

        let Some(task) = task else {
            return Ok(true);
        };
        if task.use_once {
            if let Some(definition) = launcher.catalog_mut().get_mut(entry.task) {
                definition.available = true;
            }
            if task.use_once_on_all_instances {
                self.registry.set_enabled(&task.code, faction, true);
            }
        }

        debug!(launcher = %id, task = %task.code, queue_index, "Task canceled");
        self.events.publish(ProductionEvent::TaskCanceled {
            launcher: id,
            task: entry.task,
            code: task.code,
            queue_pos: queue_index,
        });
        Ok(true)
    }

    // --- upgrades -----------------------------------------------------------

    /// Apply an upgrade and its triggers to a faction, then retire launchers
    /// of replaced buildings and give replacements their launchers.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::UnknownUpgrade`] if the upgrade is not in
    /// the book.
    pub fn apply_upgrade(&mut self, upgrade: &UpgradeId, faction: FactionId) -> Result<UpgradeOutcome> {
        self.apply_upgrade_from(upgrade, faction, None)
    }

    fn apply_upgrade_from(
        &mut self,
        upgrade: &UpgradeId,
        faction: FactionId,
        origin: Option<Vec2Fixed>,
    ) -> Result<UpgradeOutcome> {
        let mut ctx = UpgradeContext {
            factions: &self.factions,
            launchers: &mut self.launchers,
            buildings: &mut self.buildings,
            placement: &mut self.placement,
            events: &mut self.events,
            host: &mut self.host,
            origin,
        };
        let outcome = self.coordinator.apply(upgrade, faction, &mut ctx)?;

        for &entity in &outcome.destroyed {
            for id in self.launchers_held_by(entity) {
                let _ = self.remove_launcher(id);
            }
        }
        for building in &outcome.constructed {
            if !self.templates.contains_key(&building.code) {
                continue;
            }
            let holder = Holder::Building(BuildingHolder {
                entity: building.entity,
                code: building.code.clone(),
                health: building.health,
                is_built: true,
                destroyed: false,
                position: building.position,
                spawn_position: building.position,
                territory: building.territory,
            });
            if let Err(err) = self.spawn_launcher(building.faction, holder) {
                warn!(entity = building.entity, code = %building.code, %err, "Replacement launcher not created");
            }
        }
        for applied in &outcome.applied {
            for manager in self.managers.iter_mut().filter(|m| m.faction() == faction) {
                manager.on_upgrade_applied(applied);
            }
        }
        Ok(outcome)
    }

    // --- simulation ---------------------------------------------------------

    /// Advance one tick of `config.tick_duration` seconds.
    pub fn tick(&mut self) -> Vec<ProductionEvent> {
        self.advance(self.config.tick_duration)
    }

    /// Advance one tick of `dt` seconds and return the events it produced,
    /// along with any published since the previous call.
    pub fn advance(&mut self, dt: Fixed) -> Vec<ProductionEvent> {
        let ids: Vec<LauncherId> = self.launchers.keys().copied().collect();
        for id in ids {
            let Some(launcher) = self.launchers.get_mut(&id) else {
                continue;
            };
            if let Some(task) = launcher.advance(dt) {
                self.complete(id, task);
            }
        }

        self.update_managers(dt);
        self.tick += 1;

        #[cfg(feature = "debug-validation")]
        if let Ok(hash) = self.state_hash() {
            tracing::debug!(tick = self.tick, state_hash = hash, "Session state hash");
        }

        self.events.take_current()
    }

    fn complete(&mut self, id: LauncherId, index: usize) {
        let Some(launcher) = self.launchers.get(&id) else {
            return;
        };
        let Some(task) = launcher.catalog().get(index).cloned() else {
            return;
        };
        let faction = launcher.faction();
        let holder = launcher.holder().clone();

        debug!(launcher = %id, task = %task.code, "Task completed");
        self.events.publish(ProductionEvent::TaskCompleted {
            launcher: id,
            task: index,
            code: task.code.clone(),
        });
        if self.is_local_player(faction) {
            self.host
                .feedback()
                .play_cue(AudioCue::TaskCompleted, Some(holder.entity()));
        }

        match task.kind {
            TaskKind::CreateUnit => self.spawn_unit(&task, faction, &holder),
            TaskKind::Destroy | TaskKind::DestroyHolder => self.destroy_holder(id, &holder),
            TaskKind::UnitUpgrade | TaskKind::BuildingUpgrade => {
                if let Some(upgrade) = task.upgrade() {
                    let origin = Some(holder.position());
                    if let Err(err) = self.apply_upgrade_from(upgrade, faction, origin) {
                        warn!(launcher = %id, %upgrade, %err, "Upgrade task had no effect");
                    }
                }
            }
            _ => {}
        }

        for code in &task.unlocks {
            self.registry.set_enabled(code, faction, true);
        }
    }

    fn spawn_unit(&mut self, task: &TaskDefinition, faction: FactionId, holder: &Holder) {
        let Some(prefab) = task.pick_prefab(&mut self.rng) else {
            return;
        };
        let position: Vec2Fixed = holder.spawn_position();
        match self.config.mode {
            SessionMode::Local => {
                self.host.lifecycle().spawn_unit(
                    &prefab.code,
                    position,
                    faction,
                    holder.building_entity(),
                );
            }
            SessionMode::Replicated => {
                self.host.replication().send_creation_intent(
                    &prefab.code,
                    holder.building_entity(),
                    position,
                );
            }
        }
    }

    fn destroy_holder(&mut self, id: LauncherId, holder: &Holder) {
        let entity = holder.entity();
        let selection = self.host.selection();
        if selection.is_selected(entity) {
            selection.deselect(entity);
        }
        self.host.lifecycle().destroy_entity(entity);
        self.buildings.remove(&entity);
        if let Some(launcher) = self.launchers.get_mut(&id) {
            launcher.holder_mut().mark_destroyed();
        }
        let _ = self.remove_launcher(id);
    }

    fn update_managers(&mut self, dt: Fixed) {
        let mut managers = std::mem::take(&mut self.managers);
        for manager in &mut managers {
            manager.update(dt, self);
        }
        self.managers = managers;
    }

    /// Ask a faction's manager for `kind` to launch a task on demand.
    ///
    /// Returns whether the task was enqueued.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::InvalidState`] if the faction has no
    /// manager for this kind.
    pub fn request_auto_launch(
        &mut self,
        faction: FactionId,
        kind: TaskKind,
        launcher: LauncherId,
        task: usize,
    ) -> Result<bool> {
        let position = self
            .managers
            .iter()
            .position(|m| m.faction() == faction && m.kind() == kind)
            .ok_or_else(|| {
                ProductionError::InvalidState(format!(
                    "faction {faction} has no {kind:?} manager"
                ))
            })?;
        let mut managers = std::mem::take(&mut self.managers);
        let launched =
            managers[position].request_launch(launcher, task, RequestOrigin::OnDemand, self);
        self.managers = managers;
        Ok(launched)
    }

    // --- snapshots ----------------------------------------------------------

    /// Capture the session's production state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            tick: self.tick,
            next_launcher: self.next_launcher,
            registry: self.registry.clone(),
            records: self.coordinator.records().to_vec(),
            launchers: self.launchers.values().cloned().collect(),
            buildings: self.buildings.values().cloned().collect(),
            placement: self.placement.clone(),
            rng: RngState::capture(&self.rng),
            managers: self
                .managers
                .iter()
                .map(AutoProductionManager::snapshot)
                .collect(),
        }
    }

    /// Replace the session's production state with a snapshot.
    ///
    /// Factions, templates, the upgrade book and the host are kept; the
    /// host's ledgers belong to the wider game and are restored there.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::UnknownFaction`] if a launcher, building or
    /// manager belongs to an unregistered faction; the session is left
    /// unchanged.
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> Result<()> {
        let factions = snapshot
            .launchers
            .iter()
            .map(TaskLauncher::faction)
            .chain(snapshot.buildings.iter().map(|b| b.faction))
            .chain(snapshot.managers.iter().map(|m| m.faction));
        for faction in factions {
            if !self.factions.contains_key(&faction) {
                return Err(ProductionError::UnknownFaction(faction));
            }
        }

        self.tick = snapshot.tick;
        self.next_launcher = snapshot.next_launcher;
        self.registry = snapshot.registry;
        self.coordinator.restore_records(snapshot.records);
        self.launchers = snapshot
            .launchers
            .into_iter()
            .map(|launcher| (launcher.id(), launcher))
            .collect();
        self.buildings = snapshot
            .buildings
            .into_iter()
            .map(|building| (building.entity, building))
            .collect();
        self.placement = snapshot.placement;
        self.rng = snapshot.rng.resume();
        let policy = self.config.auto_production;
        self.managers = snapshot
            .managers
            .into_iter()
            .map(|manager| AutoProductionManager::from_snapshot(policy, manager))
            .collect();
        debug!(tick = self.tick, launchers = self.launchers.len(), "Session restored");
        Ok(())
    }

    /// Determinism fingerprint of the current production state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized.
    pub fn state_hash(&self) -> Result<u64> {
        self.snapshot().state_hash()
    }
}

impl<H: Host> TaskPort for Session<H> {
    fn task_kind(&self, launcher: LauncherId, task: usize) -> Option<TaskKind> {
        self.launchers
            .get(&launcher)?
            .catalog()
            .get(task)
            .map(|definition| definition.kind)
    }

    fn launch(&mut self, launcher: LauncherId, task: usize) -> Result<AdmissionResult> {
        Session::launch(self, launcher, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::{ResourceCost, ResourceLedger, Stockpile};
    use crate::factions::Controller;
    use crate::population::{PopulationCounter, PopulationLedger};
    use crate::tasks::{TaskCatalog, UnitPrefab};

    const RED: FactionId = FactionId(1);

    fn secs(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn session() -> Session {
        let mut population = PopulationCounter::new();
        population.set_max(RED, 20);
        let host = SandboxHost::new()
            .with_stockpile(Stockpile::new().with(RED, "wood", 100))
            .with_population(population);
        let mut session = Session::new(
            SessionConfig::seeded(1).with_tick_duration(Fixed::ONE),
            host,
        );
        session
            .add_faction(FactionProfile::new(RED, Controller::LocalPlayer))
            .unwrap();
        session
    }

    fn barracks(session: &mut Session) -> LauncherId {
        let catalog = TaskCatalog::new(vec![
            TaskDefinition::create_unit("train_archer", vec![UnitPrefab::new("archer")], secs(5))
                .with_cost(vec![ResourceCost::new("wood", 40)]),
            TaskDefinition::new("cancel", TaskKind::CancelPending, Fixed::ZERO),
        ])
        .unwrap();
        session
            .register_launcher(TaskLauncher::new(
                LauncherId(0),
                RED,
                Holder::building(50, "barracks", 500, Vec2Fixed::from_ints(4, 4)),
                catalog,
            ))
            .unwrap()
    }

    fn wood(session: &Session) -> i32 {
        session.host().stockpile.balance(RED, &"wood".into())
    }

    #[test]
    fn test_launch_debits_and_reserves_population() {
        let mut session = session();
        let id = barracks(&mut session);

        assert_eq!(session.launch(id, 0).unwrap(), AdmissionResult::Success);
        assert_eq!(wood(&session), 60);
        assert_eq!(session.host().population.current_population(RED), 1);
        assert_eq!(session.launcher(id).unwrap().timer(), secs(5));
        assert_eq!(session.host().feedback.cues, vec![AudioCue::TaskLaunched]);
    }

    #[test]
    fn test_rejection_gives_local_feedback() {
        let mut session = session();
        let id = barracks(&mut session);
        session.launch(id, 0).unwrap();
        session.launch(id, 0).unwrap();
        assert_eq!(session.launch(id, 0).unwrap(), AdmissionResult::LowResources);
        assert_eq!(session.host().feedback.messages, vec!["Not enough resources.".to_owned()]);
        assert_eq!(session.host().feedback.cues.last(), Some(&AudioCue::TaskDeclined));
    }

    #[test]
    fn test_completion_spawns_at_holder() {
        let mut session = session();
        let id = barracks(&mut session);
        session.launch(id, 0).unwrap();

        for _ in 0..4 {
            session.tick();
        }
        assert!(session.host().world.spawned.is_empty());
        let events = session.tick();
        assert!(events
            .iter()
            .any(|e| matches!(e, ProductionEvent::TaskCompleted { task: 0, .. })));

        let spawned = &session.host().world.spawned;
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].prefab.as_str(), "archer");
        assert_eq!(spawned[0].position, Vec2Fixed::from_ints(4, 4));
        assert_eq!(spawned[0].parent, Some(50));
    }

    #[test]
    fn test_replicated_mode_sends_intent() {
        let mut session = session();
        session.config = session.config.with_mode(SessionMode::Replicated);
        let id = barracks(&mut session);
        session.launch(id, 0).unwrap();
        session.advance(secs(5));
        assert!(session.host().world.spawned.is_empty());
        assert_eq!(session.host().world.intents.len(), 1);
    }

    #[test]
    fn test_cancel_scenario() {
        let mut session = session();
        let id = barracks(&mut session);
        session.launch(id, 0).unwrap();
        session.advance(secs(2));

        assert!(session.cancel(id, 0).unwrap());
        assert_eq!(wood(&session), 100);
        let launcher = session.launcher(id).unwrap();
        assert_eq!(launcher.queue_len(), 0);
        assert_eq!(launcher.timer(), Fixed::ZERO);
        assert_eq!(session.host().population.current_population(RED), 0);
        assert!(!session.cancel(id, 0).unwrap());
    }

    #[test]
    fn test_cancel_pending_requests() {
        let mut session = session();
        let id = barracks(&mut session);
        session.launch(id, 0).unwrap();
        session.launch(id, 0).unwrap();

        assert_eq!(session.launch(id, 1).unwrap(), AdmissionResult::Success);
        assert_eq!(session.launcher(id).unwrap().queue_len(), 1);

        let result = session
            .request(id, TaskRequest::CancelPending { queue_index: 0 })
            .unwrap();
        assert_eq!(result, AdmissionResult::Success);
        assert_eq!(session.launcher(id).unwrap().queue_len(), 0);
        assert_eq!(wood(&session), 100);

        assert_eq!(
            session
                .request(id, TaskRequest::CancelPending { queue_index: 3 })
                .unwrap(),
            AdmissionResult::Success
        );
    }

    #[test]
    fn test_unknown_ids() {
        let mut session = session();
        let id = barracks(&mut session);
        assert!(matches!(
            session.launch(LauncherId(99), 0),
            Err(ProductionError::LauncherNotFound(_))
        ));
        assert!(matches!(
            session.launch(id, 7),
            Err(ProductionError::TaskNotFound { index: 7, .. })
        ));
        assert!(session.cancel(LauncherId(99), 0).is_err());
    }

    #[test]
    fn test_destroy_task_removes_launcher_without_refund() {
        let mut session = session();
        let catalog = TaskCatalog::new(vec![
            TaskDefinition::create_unit("train_archer", vec![UnitPrefab::new("archer")], secs(5))
                .with_cost(vec![ResourceCost::new("wood", 40)]),
            TaskDefinition::new("demolish", TaskKind::Destroy, secs(1)),
        ])
        .unwrap();
        let id = session
            .register_launcher(TaskLauncher::new(
                LauncherId(0),
                RED,
                Holder::building(51, "tower", 500, Vec2Fixed::ZERO),
                catalog,
            ))
            .unwrap();
        session.host_mut().world.select(51);

        session.launch(id, 1).unwrap();
        session.launch(id, 0).unwrap();
        let events = session.advance(secs(1));

        assert!(session.launcher(id).is_none());
        assert_eq!(session.host().world.destroyed, vec![51]);
        assert!(session.host().world.selected.is_empty());
        assert_eq!(wood(&session), 60);
        assert!(session.buildings().next().is_none());
        assert!(events.iter().any(|e| matches!(
            e,
            ProductionEvent::LauncherRemoved { discarded: 1, .. }
        )));
    }

    #[test]
    fn test_unlocks_on_completion() {
        let mut session = session();
        let catalog = TaskCatalog::new(vec![
            TaskDefinition::new("study", TaskKind::Custom, secs(1)).with_unlocks(vec!["advanced".into()]),
            TaskDefinition::new("advanced", TaskKind::Custom, secs(1)).with_available(false),
        ])
        .unwrap();
        let id = session
            .register_launcher(TaskLauncher::new(
                LauncherId(0),
                RED,
                Holder::unit(60, "scholar", 100, Vec2Fixed::ZERO),
                catalog,
            ))
            .unwrap();

        assert_eq!(session.launch(id, 1).unwrap(), AdmissionResult::Disabled);
        session.launch(id, 0).unwrap();
        session.advance(secs(1));
        assert!(session.is_task_enabled(id, 1).unwrap());
        assert_eq!(session.launch(id, 1).unwrap(), AdmissionResult::Success);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut session = session();
        let id = barracks(&mut session);
        session.launch(id, 0).unwrap();
        session.advance(secs(2));
        let snapshot = session.snapshot();
        let hash = session.state_hash().unwrap();

        session.advance(secs(3));
        assert_ne!(session.state_hash().unwrap(), hash);

        session.restore(snapshot).unwrap();
        assert_eq!(session.state_hash().unwrap(), hash);
        assert_eq!(session.launcher(id).unwrap().timer(), secs(3));
    }

    #[test]
    fn test_duplicate_faction_rejected() {
        let mut session = session();
        assert!(session
            .add_faction(FactionProfile::new(RED, Controller::LocalPlayer))
            .is_err());
    }

    #[test]
    fn test_unknown_faction_launcher_rejected() {
        let mut session = session();
        let launcher = TaskLauncher::new(
            LauncherId(0),
            FactionId(8),
            Holder::unit(1, "scout", 10, Vec2Fixed::ZERO),
            TaskCatalog::default(),
        );
        assert!(matches!(
            session.register_launcher(launcher),
            Err(ProductionError::UnknownFaction(FactionId(8)))
        ));
    }
}
