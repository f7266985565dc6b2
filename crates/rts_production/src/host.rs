//! The collaborators a session talks to, bundled behind one trait.
//!
//! A game client implements [`Host`] over its own economy, population,
//! entity and UI systems. [`SandboxHost`] wires up the in-memory versions
//! used by the headless runner and tests.

use crate::ai::strategy::{AutoFactionBinding, StrategyRoster};
use crate::economy::{ResourceLedger, Stockpile};
use crate::feedback::{EffectPool, FeedbackLog, PlayerFeedback};
use crate::population::{PopulationCounter, PopulationLedger};
use crate::world::{EntityLifecycle, ReplicationChannel, SelectionTracker, WorldRecorder};

/// External collaborators of the production subsystem.
pub trait Host {
    /// Resource balances.
    fn ledger(&self) -> &dyn ResourceLedger;
    /// Mutable resource balances.
    fn ledger_mut(&mut self) -> &mut dyn ResourceLedger;
    /// Population and type limits.
    fn population(&self) -> &dyn PopulationLedger;
    /// Mutable population and type limits.
    fn population_mut(&mut self) -> &mut dyn PopulationLedger;
    /// Entity spawning and destruction.
    fn lifecycle(&mut self) -> &mut dyn EntityLifecycle;
    /// Player selection.
    fn selection(&mut self) -> &mut dyn SelectionTracker;
    /// Input replication for replicated sessions.
    fn replication(&mut self) -> &mut dyn ReplicationChannel;
    /// Player messages and audio.
    fn feedback(&mut self) -> &mut dyn PlayerFeedback;
    /// Visual effects.
    fn effects(&mut self) -> &mut dyn EffectPool;
    /// Autonomous faction strategy hook.
    fn binding(&mut self) -> &mut dyn AutoFactionBinding;
}

/// In-memory host.
#[derive(Debug, Clone, Default)]
pub struct SandboxHost {
    /// Resource balances.
    pub stockpile: Stockpile,
    /// Population and type limits.
    pub population: PopulationCounter,
    /// Entity, selection and replication requests.
    pub world: WorldRecorder,
    /// Messages, cues and effects.
    pub feedback: FeedbackLog,
    /// Autonomous faction strategies.
    pub strategies: StrategyRoster,
}

impl SandboxHost {
    /// Create an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self {
            world: WorldRecorder::new(),
            ..Self::default()
        }
    }

    /// Use a prepared stockpile.
    #[must_use]
    pub fn with_stockpile(mut self, stockpile: Stockpile) -> Self {
        self.stockpile = stockpile;
        self
    }

    /// Use a prepared population counter.
    #[must_use]
    pub fn with_population(mut self, population: PopulationCounter) -> Self {
        self.population = population;
        self
    }
}

impl Host for SandboxHost {
    fn ledger(&self) -> &dyn ResourceLedger {
        &self.stockpile
    }

    fn ledger_mut(&mut self) -> &mut dyn ResourceLedger {
        &mut self.stockpile
    }

    fn population(&self) -> &dyn PopulationLedger {
        &self.population
    }

    fn population_mut(&mut self) -> &mut dyn PopulationLedger {
        &mut self.population
    }

    fn lifecycle(&mut self) -> &mut dyn EntityLifecycle {
        &mut self.world
    }

    fn selection(&mut self) -> &mut dyn SelectionTracker {
        &mut self.world
    }

    fn replication(&mut self) -> &mut dyn ReplicationChannel {
        &mut self.world
    }

    fn feedback(&mut self) -> &mut dyn PlayerFeedback {
        &mut self.feedback
    }

    fn effects(&mut self) -> &mut dyn EffectPool {
        &mut self.feedback
    }

    fn binding(&mut self) -> &mut dyn AutoFactionBinding {
        &mut self.strategies
    }
}
