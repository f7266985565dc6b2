//! Production strategies of autonomous factions.
//!
//! Each autonomous faction keeps one strategy object per entity type it
//! produces, plus the roles (builder, collector, ...) those strategies fill.
//! When an upgrade replaces a type, the strategy for the old type is retired
//! and the replacement takes over its roles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProductionError, Result};
use crate::factions::FactionId;
use crate::tasks::TypeCode;

/// Job a strategy performs for its faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StrategyRole {
    /// Produces the faction's construction units.
    Builder,
    /// Produces the faction's resource gatherers.
    Collector,
    /// Produces the faction's army.
    Army,
    /// Builds population-providing buildings.
    PopulationBuilding,
    /// Builds territory centers.
    CenterBuilding,
}

/// Production strategy for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionStrategy {
    /// Entity type this strategy produces.
    pub code: TypeCode,
    /// Whether the faction currently runs this strategy.
    pub active: bool,
}

/// Hook notified when an upgrade replaces an entity type in an autonomous
/// faction.
pub trait AutoFactionBinding {
    /// Retire the strategy for `source` and hand its roles to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::MissingStrategy`] if either side has no
    /// strategy for this faction.
    fn swap_strategy(&mut self, faction: FactionId, source: &TypeCode, target: &TypeCode)
        -> Result<()>;
}

/// One faction's strategies and role assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyBook {
    strategies: BTreeMap<TypeCode, ProductionStrategy>,
    roles: BTreeMap<StrategyRole, TypeCode>,
}

impl StrategyBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inactive strategy for `code`.
    #[must_use]
    pub fn with_strategy(mut self, code: impl Into<TypeCode>) -> Self {
        let code = code.into();
        self.strategies
            .entry(code.clone())
            .or_insert(ProductionStrategy {
                code,
                active: false,
            });
        self
    }

    /// Assign a role, adding and activating the strategy if needed.
    #[must_use]
    pub fn with_role(mut self, role: StrategyRole, code: impl Into<TypeCode>) -> Self {
        let code = code.into();
        self.strategies
            .entry(code.clone())
            .or_insert(ProductionStrategy {
                code: code.clone(),
                active: true,
            })
            .active = true;
        self.roles.insert(role, code);
        self
    }

    /// Strategy for an entity type.
    #[must_use]
    pub fn strategy(&self, code: &TypeCode) -> Option<&ProductionStrategy> {
        self.strategies.get(code)
    }

    /// Whether the strategy for `code` is running.
    #[must_use]
    pub fn is_active(&self, code: &TypeCode) -> bool {
        self.strategies.get(code).is_some_and(|s| s.active)
    }

    /// Entity type currently filling a role.
    #[must_use]
    pub fn role(&self, role: StrategyRole) -> Option<&TypeCode> {
        self.roles.get(&role)
    }

    fn swap(&mut self, faction: FactionId, source: &TypeCode, target: &TypeCode) -> Result<()> {
        for code in [source, target] {
            if !self.strategies.contains_key(code) {
                return Err(ProductionError::MissingStrategy {
                    faction,
                    code: code.clone(),
                });
            }
        }

        if let Some(old) = self.strategies.get_mut(source) {
            old.active = false;
        }
        if let Some(new) = self.strategies.get_mut(target) {
            new.active = true;
        }
        for (role, code) in &mut self.roles {
            if *code == *source {
                debug!(%faction, ?role, %source, %target, "Strategy role reassigned");
                code.clone_from(target);
            }
        }
        Ok(())
    }
}

/// Strategy books for every autonomous faction in a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRoster {
    books: BTreeMap<FactionId, StrategyBook>,
}

impl StrategyRoster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a faction's book.
    pub fn insert(&mut self, faction: FactionId, book: StrategyBook) {
        self.books.insert(faction, book);
    }

    /// A faction's book.
    #[must_use]
    pub fn get(&self, faction: FactionId) -> Option<&StrategyBook> {
        self.books.get(&faction)
    }
}

impl AutoFactionBinding for StrategyRoster {
    fn swap_strategy(
        &mut self,
        faction: FactionId,
        source: &TypeCode,
        target: &TypeCode,
    ) -> Result<()> {
        let book = self
            .books
            .get_mut(&faction)
            .ok_or_else(|| ProductionError::MissingStrategy {
                faction,
                code: source.clone(),
            })?;
        book.swap(faction, source, target)
    }
}
