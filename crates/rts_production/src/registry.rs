//! Faction-scoped task availability overrides.
//!
//! A record for `(task code, faction)` takes precedence over the task's
//! default availability on every launcher of that faction. Records are never
//! removed; they live as long as the session.

use serde::{Deserialize, Serialize};

use crate::factions::FactionId;
use crate::tasks::TaskCode;

/// One availability override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggledTaskRecord {
    /// Task code.
    pub code: TaskCode,
    /// Faction the override applies to.
    pub faction: FactionId,
    /// Whether the task is enabled.
    pub enabled: bool,
}

/// Registry of availability overrides.
///
/// Records are kept in insertion order so snapshots are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRegistry {
    records: Vec<ToggledTaskRecord>,
}

impl TaskRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable a task for a faction, updating any existing record.
    pub fn set_enabled(&mut self, code: &TaskCode, faction: FactionId, enabled: bool) {
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|r| &r.code == code && r.faction == faction)
        {
            record.enabled = enabled;
            return;
        }
        self.records.push(ToggledTaskRecord {
            code: code.clone(),
            faction,
            enabled,
        });
    }

    /// Override for the task if one exists, else `default`.
    #[must_use]
    pub fn is_enabled(&self, code: &TaskCode, faction: FactionId, default: bool) -> bool {
        self.records
            .iter()
            .find(|r| &r.code == code && r.faction == faction)
            .map_or(default, |r| r.enabled)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no override has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &ToggledTaskRecord> {
        self.records.iter()
    }
}
