//! Playback state owned by the orchestrator
//!
//! Only the orchestrator mutates this, always under its lock, so every
//! transition below happens atomically with respect to the others.

use crate::playback::pacer::{Pacer, PacerStatus};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    /// No active source
    Idle,
    /// Source, pacer and broadcaster connected
    Playing,
    /// Effect injection in progress
    Splicing,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Splicing => "splicing",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub song: Option<PathBuf>,
    pub bytes_per_second: u64,
    /// Pacer currently feeding the broadcaster
    pub pacer: Option<Pacer>,
    /// Pacer pre-wired to the broadcaster while a splice is in flight
    pub pending_pacer: Option<Pacer>,
    /// Bumped by every transition that supersedes an in-flight splice
    pub generation: u64,
    /// Incremented on every successful start
    pub session: u64,
    pub last_error: Option<String>,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            song: None,
            bytes_per_second: 0,
            pacer: None,
            pending_pacer: None,
            generation: 0,
            session: 0,
            last_error: None,
        }
    }

    pub fn has_pacer(&self) -> bool {
        self.pacer.is_some() || self.pending_pacer.is_some()
    }

    /// End every pacer, invalidate in-flight splices and go idle
    pub fn halt(&mut self) {
        for pacer in self.pacer.take().into_iter().chain(self.pending_pacer.take()) {
            pacer.end();
        }
        self.generation += 1;
        self.status = PlaybackStatus::Idle;
    }

    /// Fold a pacer's termination into the state machine
    ///
    /// Only the active pacer while `Playing` counts; a superseded pacer, or
    /// the paused one mid-splice, is ignored. Returns true when this ended
    /// playback.
    pub fn reconcile(&mut self, pacer_id: u64, status: &PacerStatus) -> bool {
        if self.status != PlaybackStatus::Playing || !status.is_terminal() {
            return false;
        }
        match &self.pacer {
            Some(pacer) if pacer.id() == pacer_id => {}
            _ => return false,
        }

        self.pacer = None;
        self.status = PlaybackStatus::Idle;
        if let PacerStatus::Failed(message) = status {
            self.last_error = Some(message.clone());
        }
        true
    }

    /// Check the active pacer directly, for callers that cannot wait for
    /// its watcher to run
    pub fn refresh(&mut self) -> Option<PacerStatus> {
        let (id, status) = match &self.pacer {
            Some(pacer) => (pacer.id(), pacer.status()),
            None => return None,
        };
        self.reconcile(id, &status).then_some(status)
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of playback for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    pub song: Option<String>,
    pub bytes_per_second: u64,
    pub pacer_id: Option<u64>,
    pub session: u64,
    pub generation: u64,
    pub listeners: usize,
    pub producers: usize,
    pub last_error: Option<String>,
}
