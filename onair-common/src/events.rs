//! Event types for the OnAir event stream

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Radio event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RadioEvent {
    /// Broadcast began (or restarted) with a freshly probed pacing rate
    PlaybackStarted {
        song: String,
        bytes_per_second: u64,
        session: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Broadcast stopped: operator request, song exhausted, or failure
    PlaybackStopped {
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A sound effect was spliced into the live stream
    EffectApplied {
        effect: String,
        generation: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A splice could not be completed; playback was stopped
    SpliceFailed {
        effect: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A listener attached to the audio stream
    ListenerConnected {
        listener_id: Uuid,
        listeners: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl RadioEvent {
    /// Get event type as string for SSE event names
    pub fn event_type(&self) -> &str {
        match self {
            RadioEvent::PlaybackStarted { .. } => "PlaybackStarted",
            RadioEvent::PlaybackStopped { .. } => "PlaybackStopped",
            RadioEvent::EffectApplied { .. } => "EffectApplied",
            RadioEvent::SpliceFailed { .. } => "SpliceFailed",
            RadioEvent::ListenerConnected { .. } => "ListenerConnected",
        }
    }

    pub fn playback_stopped(reason: impl Into<String>) -> Self {
        RadioEvent::PlaybackStopped {
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}
