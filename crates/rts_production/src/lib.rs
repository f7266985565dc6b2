//! # RTS Production
//!
//! Deterministic production queues, task admission and faction-wide upgrade
//! propagation for Post-Scarcity RTS.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Everything the subsystem needs from the wider game (resources,
//! population, entity lifecycle, selection, replication, player feedback,
//! AI strategy bindings) is reached through the traits bundled by
//! [`host::Host`]. [`host::SandboxHost`] implements them in memory for the
//! headless runner and for tests.
//!
//! ## Crate Structure
//!
//! - [`tasks`] - Task definitions and per-launcher catalogs
//! - [`registry`] - Faction-wide task availability overrides
//! - [`launcher`] - Task queues and their timers
//! - [`admission`] - Launch admission checks
//! - [`upgrades`] - Unit and building upgrade propagation
//! - [`ai`] - Autonomous faction production and strategy bindings
//! - [`session`] - One match's production state and tick loop
//! - [`snapshot`] - Serializable session state and determinism hashing
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod admission;
pub mod ai;
pub mod config;
pub mod data;
pub mod economy;
pub mod error;
pub mod events;
pub mod factions;
pub mod feedback;
pub mod host;
pub mod launcher;
pub mod math;
pub mod population;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod tasks;
pub mod upgrades;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::admission::AdmissionResult;
    pub use crate::ai::{AutoFactionBinding, AutoProductionManager, StrategyBook, StrategyRole};
    pub use crate::config::{AutoProductionConfig, SessionConfig, SessionMode, TICK_RATE};
    pub use crate::data::ProductionData;
    pub use crate::economy::{ResourceCost, ResourceId, ResourceLedger, Stockpile};
    pub use crate::error::{ProductionError, Result};
    pub use crate::events::{ProductionEvent, SubscriberId};
    pub use crate::factions::{Controller, FactionId, FactionProfile};
    pub use crate::host::{Host, SandboxHost};
    pub use crate::launcher::{LauncherId, LauncherTemplate, QueueEntry, TaskLauncher};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::population::{PopulationCounter, PopulationLedger};
    pub use crate::registry::TaskRegistry;
    pub use crate::session::{Session, TaskRequest};
    pub use crate::snapshot::SessionSnapshot;
    pub use crate::tasks::{TaskCatalog, TaskCode, TaskDefinition, TaskKind, TypeCode, UnitPrefab};
    pub use crate::upgrades::{
        BuildingUpgrade, UnitReplacement, UnitUpgrade, UpgradeBook, UpgradeDefinition, UpgradeId,
    };
    pub use crate::world::{EntityId, Holder, PlacedBuilding};
}
