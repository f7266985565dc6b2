//! Observable production events and the session-owned event bus.
//!
//! Events are published in the order the session performs the underlying
//! state changes. Every subscriber sees the same sequence.

use serde::{Deserialize, Serialize};

use crate::factions::FactionId;
use crate::launcher::LauncherId;
use crate::tasks::{TaskCode, TypeCode};
use crate::upgrades::UpgradeId;

/// Something UI, audio or AI code may react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionEvent {
    /// A launcher was registered.
    LauncherAdded {
        /// The launcher.
        launcher: LauncherId,
        /// Owning faction.
        faction: FactionId,
    },
    /// A launcher was removed and its queue discarded.
    LauncherRemoved {
        /// The launcher.
        launcher: LauncherId,
        /// Owning faction.
        faction: FactionId,
        /// Entries discarded without refund.
        discarded: usize,
    },
    /// A task entered a queue.
    TaskLaunched {
        /// The launcher.
        launcher: LauncherId,
        /// Catalog index.
        task: usize,
        /// Task code.
        code: TaskCode,
        /// Queue position of the new entry.
        queue_pos: usize,
    },
    /// The head entry of a queue finished.
    TaskCompleted {
        /// The launcher.
        launcher: LauncherId,
        /// Catalog index.
        task: usize,
        /// Task code.
        code: TaskCode,
    },
    /// A pending entry was canceled and refunded.
    TaskCanceled {
        /// The launcher.
        launcher: LauncherId,
        /// Catalog index.
        task: usize,
        /// Task code.
        code: TaskCode,
        /// Queue position the entry was removed from.
        queue_pos: usize,
    },
    /// A unit upgrade was applied to a faction.
    UnitUpgraded {
        /// The upgrade.
        upgrade: UpgradeId,
        /// Upgraded faction.
        faction: FactionId,
        /// Replaced unit type.
        source: TypeCode,
        /// Replacement unit type.
        target: TypeCode,
    },
    /// A building upgrade was applied to a faction.
    BuildingUpgraded {
        /// The upgrade.
        upgrade: UpgradeId,
        /// Upgraded faction.
        faction: FactionId,
        /// Replaced building type.
        source: TypeCode,
        /// Replacement building type.
        target: TypeCode,
    },
}

impl ProductionEvent {
    /// Launcher the event concerns, if any.
    #[must_use]
    pub const fn launcher(&self) -> Option<LauncherId> {
        match self {
            Self::LauncherAdded { launcher, .. }
            | Self::LauncherRemoved { launcher, .. }
            | Self::TaskLaunched { launcher, .. }
            | Self::TaskCompleted { launcher, .. }
            | Self::TaskCanceled { launcher, .. } => Some(*launcher),
            Self::UnitUpgraded { .. } | Self::BuildingUpgraded { .. } => None,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

/// Publish/subscribe queue owned by a session.
///
/// The bus keeps the events of the current tick for the caller of
/// `Session::tick` and a separate backlog for each subscriber.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    current: Vec<ProductionEvent>,
    subscribers: Vec<Vec<ProductionEvent>>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. It sees events published from now on.
    pub fn subscribe(&mut self) -> SubscriberId {
        self.subscribers.push(Vec::new());
        SubscriberId(self.subscribers.len() - 1)
    }

    /// Publish an event to the current batch and every subscriber.
    pub fn publish(&mut self, event: ProductionEvent) {
        for backlog in &mut self.subscribers {
            backlog.push(event.clone());
        }
        self.current.push(event);
    }

    /// Take everything published since the last call.
    pub fn take_current(&mut self) -> Vec<ProductionEvent> {
        std::mem::take(&mut self.current)
    }

    /// Take a subscriber's backlog.
    pub fn drain(&mut self, subscriber: SubscriberId) -> Vec<ProductionEvent> {
        self.subscribers
            .get_mut(subscriber.0)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(id: u32) -> ProductionEvent {
        ProductionEvent::TaskCompleted {
            launcher: LauncherId(id),
            task: 0,
            code: TaskCode::new("t"),
        }
    }

    #[test]
    fn test_subscribers_see_events_after_subscribing() {
        let mut bus = EventBus::new();
        bus.publish(completed(1));
        let ui = bus.subscribe();
        bus.publish(completed(2));

        assert_eq!(bus.drain(ui), vec![completed(2)]);
        assert!(bus.drain(ui).is_empty());
        assert_eq!(bus.take_current(), vec![completed(1), completed(2)]);
        assert!(bus.take_current().is_empty());
    }

    #[test]
    fn test_independent_backlogs() {
        let mut bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(completed(3));
        assert_eq!(bus.drain(a).len(), 1);
        assert_eq!(bus.drain(b).len(), 1);
    }

    #[test]
    fn test_event_launcher() {
        assert_eq!(completed(7).launcher(), Some(LauncherId(7)));
        let upgraded = ProductionEvent::UnitUpgraded {
            upgrade: UpgradeId::new("u"),
            faction: FactionId(1),
            source: TypeCode::new("a"),
            target: TypeCode::new("b"),
        };
        assert_eq!(upgraded.launcher(), None);
    }
}
