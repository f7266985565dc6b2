//! Error types for the production subsystem.
//!
//! Admission failures are not errors; they are reported through
//! [`AdmissionResult`](crate::admission::AdmissionResult). The variants here
//! cover API misuse, bad data and broken configuration.

use thiserror::Error;

use crate::factions::FactionId;
use crate::launcher::LauncherId;
use crate::tasks::TypeCode;
use crate::upgrades::UpgradeId;

/// Result type alias using [`ProductionError`].
pub type Result<T> = std::result::Result<T, ProductionError>;

/// Top-level error type for the production subsystem.
#[derive(Debug, Error)]
pub enum ProductionError {
    /// No launcher registered under this ID.
    #[error("Launcher not found: {0}")]
    LauncherNotFound(LauncherId),

    /// No task at this index in the launcher's catalog.
    #[error("Launcher {launcher} has no task at index {index}")]
    TaskNotFound {
        /// Launcher that was queried.
        launcher: LauncherId,
        /// Requested catalog index.
        index: usize,
    },

    /// Faction has not been registered with the session.
    #[error("Unknown faction: {0}")]
    UnknownFaction(FactionId),

    /// Upgrade definition is not in the upgrade book.
    #[error("Unknown upgrade: {0}")]
    UnknownUpgrade(UpgradeId),

    /// Trigger upgrades lead back to an upgrade already applied in this cascade.
    #[error("Upgrade cycle detected at '{0}'")]
    UpgradeCycle(UpgradeId),

    /// An autonomous faction has no production strategy for an entity type.
    #[error("Faction {faction} has no production strategy for '{code}'")]
    MissingStrategy {
        /// Faction whose strategy book was searched.
        faction: FactionId,
        /// Entity type code without a strategy.
        code: TypeCode,
    },

    /// Data file parsing error.
    #[error("Failed to parse production data: {0}")]
    DataParseError(String),

    /// Snapshot could not be encoded or decoded.
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Invalid session state.
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}
