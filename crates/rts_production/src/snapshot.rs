//! Serializable session state.
//!
//! A snapshot holds everything that decides what a session does next:
//! registry overrides, recorded upgrades, every launcher's catalog, queue
//! and timer, the building roster and placement menus. Its hash is the
//! determinism fingerprint compared across runs.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::ai::TrackedTask;
use crate::error::{ProductionError, Result};
use crate::factions::FactionId;
use crate::launcher::TaskLauncher;
use crate::math::{fixed_serde, Fixed};
use crate::registry::TaskRegistry;
use crate::tasks::TaskKind;
use crate::upgrades::AutonomousUpgradeRecord;
use crate::world::{PlacedBuilding, PlacementCatalog};

/// Position of a ChaCha stream: its seed and how many words it has produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    /// Seed the stream was created from.
    pub seed: [u8; 32],
    /// Words consumed so far.
    pub word_pos: u128,
}

impl RngState {
    /// Capture a stream's position.
    #[must_use]
    pub fn capture(rng: &ChaCha8Rng) -> Self {
        Self {
            seed: rng.get_seed(),
            word_pos: rng.get_word_pos(),
        }
    }

    /// Rebuild the stream at the captured position.
    #[must_use]
    pub fn resume(&self) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::from_seed(self.seed);
        rng.set_word_pos(self.word_pos);
        rng
    }
}

/// An autonomous production manager's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    /// Faction served.
    pub faction: FactionId,
    /// Task kind launched.
    pub kind: TaskKind,
    /// Seconds until the next scan.
    #[serde(with = "fixed_serde")]
    pub timer: Fixed,
    /// Tracked tasks in registration order.
    pub tracked: Vec<TrackedTask>,
    /// Random stream position.
    pub rng: RngState,
}

/// Production state of a session at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Ticks simulated.
    pub tick: u64,
    /// Next launcher ID to hand out.
    pub next_launcher: u32,
    /// Availability overrides.
    pub registry: TaskRegistry,
    /// Applied unit upgrades.
    pub records: Vec<AutonomousUpgradeRecord>,
    /// Launchers in ID order.
    pub launchers: Vec<TaskLauncher>,
    /// Standing buildings in entity order.
    pub buildings: Vec<PlacedBuilding>,
    /// Placement menus.
    pub placement: PlacementCatalog,
    /// Prefab pick stream.
    pub rng: RngState,
    /// Autonomous production managers in creation order.
    pub managers: Vec<ManagerSnapshot>,
}

impl SessionSnapshot {
    /// Encode with bincode.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| ProductionError::Snapshot(format!("Failed to serialize session: {e}")))
    }

    /// Decode from bincode.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid snapshot.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| ProductionError::Snapshot(format!("Failed to deserialize session: {e}")))
    }

    /// Hash of the encoded snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn state_hash(&self) -> Result<u64> {
        let bytes = self.to_bytes()?;
        let mut hasher = DefaultHasher::new();
        hasher.write(&bytes);
        Ok(hasher.finish())
    }
}
