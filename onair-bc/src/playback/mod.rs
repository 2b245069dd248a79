//! Playback pipeline: pacing and the orchestrator state machine

pub mod orchestrator;
pub mod pacer;
pub mod session;

pub use orchestrator::{Orchestrator, OrchestratorSettings, SpliceHandle, SpliceOutcome};
pub use pacer::{DetachedSource, Pacer, PacerStatus};
pub use session::{PlaybackSnapshot, PlaybackState, PlaybackStatus};
