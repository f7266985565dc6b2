//! Resource costs and the faction resource ledger.
//!
//! The ledger is owned by the wider game; this module defines the contract
//! the production subsystem relies on plus [`Stockpile`], an in-memory ledger
//! used by the headless runner and tests.
//!
//! All amounts are integers for deterministic simulation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::factions::FactionId;

/// Identifier of a resource type (e.g. `"wood"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Create a new resource ID.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCost {
    /// Resource type.
    pub resource: ResourceId,
    /// Amount required.
    pub amount: i32,
}

impl ResourceCost {
    /// Create a new cost entry.
    #[must_use]
    pub fn new(resource: impl Into<ResourceId>, amount: i32) -> Self {
        Self {
            resource: resource.into(),
            amount,
        }
    }
}

/// Faction-scoped resource balances.
pub trait ResourceLedger {
    /// Whether the faction can pay every entry of `costs`.
    fn can_afford(&self, costs: &[ResourceCost], faction: FactionId) -> bool;

    /// Remove `costs` from the faction's balances.
    fn debit(&mut self, costs: &[ResourceCost], faction: FactionId);

    /// Return `costs` to the faction's balances.
    fn credit(&mut self, costs: &[ResourceCost], faction: FactionId);

    /// Current balance of one resource.
    fn balance(&self, faction: FactionId, resource: &ResourceId) -> i32;
}

/// In-memory resource ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stockpile {
    balances: BTreeMap<(FactionId, ResourceId), i32>,
}

impl Stockpile {
    /// Create an empty stockpile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a balance directly.
    pub fn set(&mut self, faction: FactionId, resource: impl Into<ResourceId>, amount: i32) {
        self.balances.insert((faction, resource.into()), amount);
    }

    /// Set a balance, builder style.
    #[must_use]
    pub fn with(mut self, faction: FactionId, resource: impl Into<ResourceId>, amount: i32) -> Self {
        self.set(faction, resource, amount);
        self
    }

    fn entry(&mut self, faction: FactionId, resource: &ResourceId) -> &mut i32 {
        self.balances
            .entry((faction, resource.clone()))
            .or_insert(0)
    }
}

impl ResourceLedger for Stockpile {
    fn can_afford(&self, costs: &[ResourceCost], faction: FactionId) -> bool {
        // Duplicate entries for one resource must be summed before comparing.
        let mut needed: BTreeMap<&ResourceId, i64> = BTreeMap::new();
        for cost in costs {
            *needed.entry(&cost.resource).or_insert(0) += i64::from(cost.amount);
        }
        needed
            .into_iter()
            .all(|(resource, amount)| i64::from(self.balance(faction, resource)) >= amount)
    }

    fn debit(&mut self, costs: &[ResourceCost], faction: FactionId) {
        for cost in costs {
            *self.entry(faction, &cost.resource) -= cost.amount;
        }
    }

    fn credit(&mut self, costs: &[ResourceCost], faction: FactionId) {
        for cost in costs {
            *self.entry(faction, &cost.resource) += cost.amount;
        }
    }

    fn balance(&self, faction: FactionId, resource: &ResourceId) -> i32 {
        self.balances
            .get(&(faction, resource.clone()))
            .copied()
            .unwrap_or(0)
    }
}
