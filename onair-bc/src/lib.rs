//! # OnAir Broadcast Service Library (onair-bc)
//!
//! Live audio broadcast: one song streamed at its real-time byte rate to
//! every connected listener, with sound effects spliced into the live
//! stream on operator command.
//!
//! **Pipeline:** song file → [`playback::Pacer`] → [`broadcast::FanoutSink`]
//! → one bounded buffer per listener. Effects go through the external audio
//! tool ([`audio::Mixer`]) and re-enter the pipeline on a fresh pacer.

pub mod api;
pub mod audio;
pub mod broadcast;
pub mod config;
pub mod controller;
pub mod effects;
pub mod error;
pub mod playback;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;

use audio::{AudioTool, BitrateProber, MixSettings, Mixer};
use broadcast::ListenerRegistry;
use config::RadioConfig;
use controller::RadioController;
use effects::EffectLibrary;
use playback::{Orchestrator, OrchestratorSettings};
use std::sync::Arc;

/// Wire every component for `config` around `tool`
pub fn build_app_context(config: &RadioConfig, tool: Arc<dyn AudioTool>) -> api::AppContext {
    let state = Arc::new(SharedState::new());
    let registry = ListenerRegistry::new(
        config.listeners.buffer_chunks,
        config.listeners.max_lagged_chunks,
    );
    let prober = BitrateProber::new(
        Arc::clone(&tool),
        config.audio.fallback_bit_rate,
        config.audio.probe_timeout(),
    );
    let mixer = Mixer::new(tool, MixSettings::from(&config.audio));

    let orchestrator = Orchestrator::new(
        OrchestratorSettings::from(config),
        prober,
        mixer,
        registry,
        Arc::clone(&state),
    );
    let controller = RadioController::new(
        orchestrator,
        EffectLibrary::new(config.paths.fx_dir.clone()),
    );

    api::AppContext {
        state,
        controller,
        public_dir: config.paths.public_dir.clone(),
    }
}
