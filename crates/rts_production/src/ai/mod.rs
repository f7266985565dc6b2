//! Autonomous faction support: strategy bindings and automatic production.

pub mod production;
pub mod strategy;

pub use production::{AutoProductionManager, ManagerState, RequestOrigin, TaskPort, TrackedTask};
pub use strategy::{AutoFactionBinding, ProductionStrategy, StrategyBook, StrategyRole, StrategyRoster};
