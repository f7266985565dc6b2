//! Faction identifiers and per-session faction profiles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tasks::TypeCode;

/// Unique identifier for a faction slot in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactionId(pub u32);

impl FactionId {
    /// Create a new faction ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for FactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who drives a faction's decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Controller {
    /// The human player on this machine. Receives UI feedback and effects.
    #[default]
    LocalPlayer,
    /// A human on another machine in a replicated session.
    RemotePlayer,
    /// AI-controlled; production driven by auto-production managers.
    Autonomous,
}

/// A faction registered with a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionProfile {
    /// Faction slot.
    pub id: FactionId,
    /// Faction type code, matched against faction-specific tasks.
    pub type_code: Option<TypeCode>,
    /// Who controls this faction.
    pub controller: Controller,
}

impl FactionProfile {
    /// Create a new faction profile.
    #[must_use]
    pub fn new(id: FactionId, controller: Controller) -> Self {
        Self {
            id,
            type_code: None,
            controller,
        }
    }

    /// Set the faction type code.
    #[must_use]
    pub fn with_type_code(mut self, code: impl Into<TypeCode>) -> Self {
        self.type_code = Some(code.into());
        self
    }

    /// Whether this faction is the locally rendered human player.
    #[must_use]
    pub const fn is_local_player(&self) -> bool {
        matches!(self.controller, Controller::LocalPlayer)
    }

    /// Whether this faction is AI-controlled.
    #[must_use]
    pub const fn is_autonomous(&self) -> bool {
        matches!(self.controller, Controller::Autonomous)
    }
}
