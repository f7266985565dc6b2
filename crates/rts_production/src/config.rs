//! Session and AI configuration.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_decimal, Fixed, FixedRange};

/// Simulation ticks per second.
pub const TICK_RATE: u32 = 20;

/// How the session turns completed creation tasks into units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionMode {
    /// Authoritative single session: spawn units directly.
    #[default]
    Local,
    /// Multi-party session: send creation intents over the replication channel.
    Replicated,
}

/// Policy for an autonomous faction's production manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoProductionConfig {
    /// Launch tracked tasks when the manager's timer fires.
    #[serde(default = "default_true")]
    pub auto_launch: bool,
    /// Accept launch requests from other AI components.
    #[serde(default = "default_true")]
    pub on_demand: bool,
    /// Seconds between scans, drawn anew after each scan.
    #[serde(default = "default_reload_range")]
    pub reload_range: FixedRange,
    /// Acceptance threshold range for the launch roll.
    #[serde(default = "default_acceptance_range")]
    pub acceptance_range: FixedRange,
}

const fn default_true() -> bool {
    true
}

fn default_reload_range() -> FixedRange {
    FixedRange::new(Fixed::from_num(5), Fixed::from_num(10))
}

fn default_acceptance_range() -> FixedRange {
    FixedRange::new(Fixed::from_num(0.5), Fixed::from_num(0.8))
}

impl Default for AutoProductionConfig {
    fn default() -> Self {
        Self {
            auto_launch: true,
            on_demand: true,
            reload_range: default_reload_range(),
            acceptance_range: default_acceptance_range(),
        }
    }
}

impl AutoProductionConfig {
    /// Managers that always accept and scan every `interval` seconds.
    #[must_use]
    pub fn eager(interval: Fixed) -> Self {
        Self {
            reload_range: FixedRange::exactly(interval),
            acceptance_range: FixedRange::exactly(Fixed::ONE),
            ..Self::default()
        }
    }

    /// Managers that never launch anything on their own.
    #[must_use]
    pub fn passive() -> Self {
        Self {
            auto_launch: false,
            on_demand: false,
            ..Self::default()
        }
    }
}

/// Configuration for a production session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seed for every random stream in the session.
    #[serde(default)]
    pub seed: u64,
    /// Unit creation routing.
    #[serde(default)]
    pub mode: SessionMode,
    /// Seconds simulated by one tick.
    #[serde(default = "default_tick_duration", with = "fixed_decimal")]
    pub tick_duration: Fixed,
    /// Policy for autonomous factions' production managers.
    #[serde(default)]
    pub auto_production: AutoProductionConfig,
}

fn default_tick_duration() -> Fixed {
    Fixed::ONE / Fixed::from_num(TICK_RATE)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            mode: SessionMode::Local,
            tick_duration: default_tick_duration(),
            auto_production: AutoProductionConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Default configuration with a seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Set the session mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the tick duration.
    #[must_use]
    pub const fn with_tick_duration(mut self, seconds: Fixed) -> Self {
        self.tick_duration = seconds;
        self
    }

    /// Set the autonomous production policy.
    #[must_use]
    pub const fn with_auto_production(mut self, config: AutoProductionConfig) -> Self {
        self.auto_production = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.mode, SessionMode::Local);
        assert_eq!(config.tick_duration, Fixed::ONE / Fixed::from_num(20));
        let auto = config.auto_production;
        assert!(auto.auto_launch && auto.on_demand);
        assert_eq!(auto.reload_range.min, Fixed::from_num(5));
        assert_eq!(auto.reload_range.max, Fixed::from_num(10));
        assert_eq!(auto.acceptance_range.min, Fixed::from_num(0.5));
        assert_eq!(auto.acceptance_range.max, Fixed::from_num(0.8));
    }

    #[test]
    fn test_ron_fills_defaults() {
        let config: SessionConfig = ron::from_str("(seed: 9, mode: Replicated)").unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.mode, SessionMode::Replicated);
        assert_eq!(config.auto_production, AutoProductionConfig::default());
    }

    #[test]
    fn test_ron_auto_production() {
        let config: AutoProductionConfig = ron::from_str(
            "(auto_launch: false, reload_range: (min: 1.0, max: 2.0), acceptance_range: (min: 1.0, max: 1.0))",
        )
        .unwrap();
        assert!(!config.auto_launch);
        assert!(config.on_demand);
        assert_eq!(config.reload_range.max, Fixed::from_num(2));
        assert_eq!(config.acceptance_range, FixedRange::exactly(Fixed::ONE));
    }
}
