//! Fire-and-forget notifications for the local player: messages, audio cues
//! and visual effects. Nothing returned from these hooks is consulted.

use serde::{Deserialize, Serialize};

use crate::math::Vec2Fixed;
use crate::world::EntityId;

/// Audio cue played for the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCue {
    /// A task was accepted into a queue.
    TaskLaunched,
    /// A task request was rejected.
    TaskDeclined,
    /// A queued task finished.
    TaskCompleted,
}

/// Messages and sounds shown to the local player.
pub trait PlayerFeedback {
    /// Show an error message.
    fn show_message(&mut self, message: &str);

    /// Play an audio cue, optionally positioned at an entity.
    fn play_cue(&mut self, cue: AudioCue, source: Option<EntityId>);
}

/// Visual effects pool.
pub trait EffectPool {
    /// Play an upgrade effect at a position.
    fn play_upgrade_effect(&mut self, effect: &str, position: Vec2Fixed);
}

/// Records every notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackLog {
    /// Messages shown.
    pub messages: Vec<String>,
    /// Cues played.
    pub cues: Vec<AudioCue>,
    /// Effects played.
    pub effects: Vec<(String, Vec2Fixed)>,
}

impl FeedbackLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlayerFeedback for FeedbackLog {
    fn show_message(&mut self, message: &str) {
        self.messages.push(message.to_owned());
    }

    fn play_cue(&mut self, cue: AudioCue, _source: Option<EntityId>) {
        self.cues.push(cue);
    }
}

impl EffectPool for FeedbackLog {
    fn play_upgrade_effect(&mut self, effect: &str, position: Vec2Fixed) {
        self.effects.push((effect.to_owned(), position));
    }
}
