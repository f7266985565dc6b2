//! Population slots and per-type creation limits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::factions::FactionId;
use crate::tasks::TypeCode;

/// Faction-scoped population and creation-limit accounting.
pub trait PopulationLedger {
    /// Occupied population slots.
    fn current_population(&self, faction: FactionId) -> u32;

    /// Population cap.
    fn max_population(&self, faction: FactionId) -> u32;

    /// Whether the faction may not create another unit of this type.
    fn has_reached_type_limit(&self, faction: FactionId, code: &TypeCode) -> bool;

    /// Add `delta` occupied slots (may be negative).
    fn adjust_population(&mut self, faction: FactionId, delta: i32);

    /// Count one more (`increment`) or one fewer unit of this type.
    fn adjust_type_limit(&mut self, faction: FactionId, code: &TypeCode, increment: bool);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct FactionPopulation {
    current: u32,
    max: u32,
    limits: BTreeMap<TypeCode, u32>,
    counts: BTreeMap<TypeCode, u32>,
}

/// In-memory population ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationCounter {
    factions: BTreeMap<FactionId, FactionPopulation>,
}

impl PopulationCounter {
    /// Create an empty counter. Unknown factions have a cap of zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a faction's population cap.
    pub fn set_max(&mut self, faction: FactionId, max: u32) {
        self.factions.entry(faction).or_default().max = max;
    }

    /// Cap how many units of `code` the faction may have at once.
    pub fn set_type_limit(&mut self, faction: FactionId, code: impl Into<TypeCode>, limit: u32) {
        self.factions
            .entry(faction)
            .or_default()
            .limits
            .insert(code.into(), limit);
    }

    /// Units of `code` counted against the limit.
    #[must_use]
    pub fn type_count(&self, faction: FactionId, code: &TypeCode) -> u32 {
        self.factions
            .get(&faction)
            .and_then(|f| f.counts.get(code))
            .copied()
            .unwrap_or(0)
    }
}

impl PopulationLedger for PopulationCounter {
    fn current_population(&self, faction: FactionId) -> u32 {
        self.factions.get(&faction).map_or(0, |f| f.current)
    }

    fn max_population(&self, faction: FactionId) -> u32 {
        self.factions.get(&faction).map_or(0, |f| f.max)
    }

    fn has_reached_type_limit(&self, faction: FactionId, code: &TypeCode) -> bool {
        let Some(state) = self.factions.get(&faction) else {
            return false;
        };
        match state.limits.get(code) {
            Some(&limit) => state.counts.get(code).copied().unwrap_or(0) >= limit,
            None => false,
        }
    }

    fn adjust_population(&mut self, faction: FactionId, delta: i32) {
        let state = self.factions.entry(faction).or_default();
        state.current = state.current.saturating_add_signed(delta);
    }

    fn adjust_type_limit(&mut self, faction: FactionId, code: &TypeCode, increment: bool) {
        let state = self.factions.entry(faction).or_default();
        let count = state.counts.entry(code.clone()).or_insert(0);
        *count = if increment {
            count.saturating_add(1)
        } else {
            count.saturating_sub(1)
        };
    }
}
