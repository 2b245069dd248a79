//! Shared service state
//!
//! Holds the event broadcaster used by the orchestrator, the listener
//! endpoint and the SSE handler.

use chrono::{DateTime, Utc};
use onair_common::events::RadioEvent;
use tokio::sync::broadcast;

/// Events buffered per SSE subscriber before it starts lagging
const EVENT_BUFFER: usize = 100;

/// Shared state accessible by all components
pub struct SharedState {
    /// Event broadcaster for SSE events
    pub event_tx: broadcast::Sender<RadioEvent>,

    /// When the service came up
    pub started_at: DateTime<Utc>,
}

impl SharedState {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            event_tx,
            started_at: Utc::now(),
        }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: RadioEvent) {
        // No receivers is fine
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<RadioEvent> {
        self.event_tx.subscribe()
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_broadcasting() {
        let state = SharedState::new();
        let mut rx = state.subscribe_events();

        state.broadcast_event(RadioEvent::playback_stopped("operator"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "PlaybackStopped");
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let state = SharedState::new();
        state.broadcast_event(RadioEvent::playback_stopped("nobody listening"));
        assert!(state.uptime_seconds() >= 0);
    }
}
