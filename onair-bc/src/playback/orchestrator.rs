//! Pipeline orchestrator
//!
//! Owns [`PlaybackState`] and drives the Idle / Playing / Splicing state
//! machine: source to pacer to broadcaster on `start`, pacer teardown on
//! `stop`, and the effect splice protocol on `append_effect`.
//!
//! **Splice protocol:**
//! 1. Spawn `next` pacer wired to the broadcaster's fan-out sink (nothing
//!    feeds it yet)
//! 2. Pause the current pacer
//! 3. Ask the current pacer to detach its source
//! 4. Once the detached source is handed back, mix the effect into it and
//!    attach the merged stream to `next`; `next` becomes the active pacer
//!    and the old one is ended
//! 5. Back to Playing
//!
//! Steps 4-5 run in a spawned completion task. Every transition that
//! supersedes a splice bumps `PlaybackState::generation`; a completion
//! task whose token no longer matches drops the detached source and
//! reports [`SpliceOutcome::Superseded`] instead of reattaching it.

use crate::audio::mixer::{MixRequest, Mixer};
use crate::audio::probe::BitrateProber;
use crate::audio::source::{self, AudioSource};
use crate::broadcast::ListenerRegistry;
use crate::config::RadioConfig;
use crate::error::{Error, Result};
use crate::playback::pacer::{DetachedSource, Pacer, PacerStatus};
use crate::playback::session::{PlaybackSnapshot, PlaybackState, PlaybackStatus};
use crate::state::SharedState;
use onair_common::events::RadioEvent;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::{oneshot, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Orchestrator tuning taken from [`RadioConfig`]
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Song broadcast on start
    pub song: PathBuf,
    /// Probed bits/s divided by this gives the pacing rate in bytes/s
    pub bit_rate_divisor: u64,
    pub ticks_per_second: u32,
}

impl From<&RadioConfig> for OrchestratorSettings {
    fn from(config: &RadioConfig) -> Self {
        Self {
            song: config.paths.song.clone(),
            bit_rate_divisor: config.audio.bit_rate_divisor,
            ticks_per_second: config.pacing.ticks_per_second,
        }
    }
}

/// How a splice ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceOutcome {
    /// The merged stream is live on the new pacer
    Applied { generation: u64 },
    /// A later stop, start or splice invalidated this one before it attached
    Superseded { generation: u64 },
}

/// Completion handle of an accepted splice
///
/// Callers may drop it; the splice proceeds regardless.
#[derive(Debug)]
pub struct SpliceHandle {
    generation: u64,
    done: oneshot::Receiver<Result<SpliceOutcome>>,
}

impl SpliceHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the splice to finish
    pub async fn wait(self) -> Result<SpliceOutcome> {
        match self.done.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Playback(format!(
                "splice {} was abandoned",
                self.generation
            ))),
        }
    }
}

struct OrchestratorInner {
    state: Mutex<PlaybackState>,
    prober: BitrateProber,
    mixer: Mixer,
    registry: ListenerRegistry,
    shared: Arc<SharedState>,
    settings: OrchestratorSettings,
}

/// Playback orchestrator; clones share the same state
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        prober: BitrateProber,
        mixer: Mixer,
        registry: ListenerRegistry,
        shared: Arc<SharedState>,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                state: Mutex::new(PlaybackState::new()),
                prober,
                mixer,
                registry,
                shared,
                settings,
            }),
        }
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.inner.registry
    }

    /// Begin broadcasting the configured song from the top
    ///
    /// Any running playback (including an in-flight splice) is torn down
    /// first. The bit rate is probed afresh every time. Returns the new
    /// session number once the song is attached to its pacer.
    pub async fn start(&self) -> Result<u64> {
        let song = self.inner.settings.song.clone();
        self.start_song(&song).await
    }

    async fn start_song(&self, song: &Path) -> Result<u64> {
        let mut state = self.lock_state().await;
        if state.has_pacer() {
            info!("Restarting playback");
            state.halt();
        }
        state.last_error = None;

        let bit_rate = self.inner.prober.probe_or_fallback(song).await;
        let bytes_per_second = (bit_rate / self.inner.settings.bit_rate_divisor).max(1);

        let source = match source::open_file(song).await {
            Ok(source) => source,
            Err(e) => {
                error!("Cannot open {}: {}", song.display(), e);
                state.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let pacer = Pacer::spawn(
            bytes_per_second,
            self.inner.settings.ticks_per_second,
            self.inner.registry.fanout_sink(),
        );
        if let Err(e) = pacer.attach(source).await {
            pacer.end();
            state.last_error = Some(e.to_string());
            return Err(e);
        }

        state.status = PlaybackStatus::Playing;
        state.song = Some(song.to_path_buf());
        state.bytes_per_second = bytes_per_second;
        state.pacer = Some(pacer.clone());
        state.session += 1;
        let session = state.session;

        info!(
            "Playback session {} started: {} at {} bytes/s",
            session,
            song.display(),
            bytes_per_second
        );
        self.inner.shared.broadcast_event(RadioEvent::PlaybackStarted {
            song: song.display().to_string(),
            bytes_per_second,
            session,
            timestamp: chrono::Utc::now(),
        });
        drop(state);

        self.watch_pacer(pacer);
        Ok(session)
    }

    /// Stop broadcasting; returns false when nothing was playing
    ///
    /// Listeners stay connected and receive nothing until the next start.
    pub async fn stop(&self) -> bool {
        let mut state = self.lock_state().await;
        if !state.has_pacer() {
            debug!("Stop requested with no active pacer");
            return false;
        }

        state.halt();
        info!("Playback stopped");
        self.inner
            .shared
            .broadcast_event(RadioEvent::playback_stopped("stopped"));
        true
    }

    /// Splice the effect at `effect` into the live stream
    ///
    /// Validation happens here; the splice itself completes asynchronously.
    /// The effect is dropped, not queued, when nothing is playing
    /// ([`Error::NotPlaying`]) or another splice is still pending
    /// ([`Error::SpliceInProgress`]).
    pub async fn append_effect(&self, effect: PathBuf) -> Result<SpliceHandle> {
        let mut state = self.lock_state().await;
        self.refresh(&mut state);

        match state.status {
            PlaybackStatus::Idle => return Err(Error::NotPlaying),
            PlaybackStatus::Splicing => return Err(Error::SpliceInProgress),
            PlaybackStatus::Playing => {}
        }
        let current = state.pacer.clone().ok_or(Error::NotPlaying)?;

        let next = Pacer::spawn(
            state.bytes_per_second,
            self.inner.settings.ticks_per_second,
            self.inner.registry.fanout_sink(),
        );
        current.pause();
        let detached = current.detach();

        state.generation += 1;
        let generation = state.generation;
        state.status = PlaybackStatus::Splicing;
        state.pending_pacer = Some(next.clone());
        drop(state);

        debug!(
            "Splice {} begun: pacer {} paused, pacer {} waiting for {}",
            generation,
            current.id(),
            next.id(),
            effect.display()
        );

        let (done_tx, done) = oneshot::channel();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let outcome = orchestrator
                .complete_splice(generation, effect, current, detached, next)
                .await;
            let _ = done_tx.send(outcome);
        });

        Ok(SpliceHandle { generation, done })
    }

    /// Steps 4-5 of the splice, once the current pacer has let go of its source
    async fn complete_splice(
        &self,
        generation: u64,
        effect: PathBuf,
        current: Pacer,
        detached: oneshot::Receiver<DetachedSource>,
        next: Pacer,
    ) -> Result<SpliceOutcome> {
        // The active pacer keeps its acknowledged source until it terminates,
        // so a refused detach means it is terminating
        let detached = match detached.await {
            Ok(detached) => Ok(detached),
            Err(_) => Err(current.wait_finished().await),
        };
        let mut state = self.lock_state().await;

        if state.generation != generation {
            debug!(
                "Splice {} superseded (now at generation {}), discarding its source",
                generation, state.generation
            );
            next.end();
            return Ok(SpliceOutcome::Superseded { generation });
        }

        let effect_name = effect_label(&effect);
        let detached = match detached {
            Ok(detached) => detached,
            Err(PacerStatus::Finished) => {
                info!(
                    "Song ended before splice {} could detach it, dropping {}",
                    generation, effect_name
                );
                state.halt();
                drop(state);
                self.announce_end(&PacerStatus::Finished);
                return Err(Error::NotPlaying);
            }
            Err(status) => {
                let failure = Error::Playback(format!(
                    "current pacer terminated ({:?}) before handing back its source",
                    status
                ));
                return Err(self.fail_splice(&mut state, &effect_name, failure));
            }
        };

        let merged = match self
            .inner
            .mixer
            .merge(MixRequest::new(effect, detached.into_source()))
        {
            Ok(merged) => merged,
            Err(e) => return Err(self.fail_splice(&mut state, &effect_name, e)),
        };

        let merged: AudioSource = Box::new(merged);
        if let Err(e) = next.attach(merged).await {
            return Err(self.fail_splice(&mut state, &effect_name, e));
        }

        let previous = state.pacer.replace(next.clone());
        state.pending_pacer = None;
        state.status = PlaybackStatus::Playing;

        if let Some(previous) = &previous {
            previous.end();
        }
        info!("Effect {} applied (splice {})", effect_name, generation);
        self.inner.shared.broadcast_event(RadioEvent::EffectApplied {
            effect: effect_name,
            generation,
            timestamp: chrono::Utc::now(),
        });
        drop(state);

        self.watch_pacer(next);

        // The old pacer releases its fan-out sink when its task exits
        if let Some(previous) = previous {
            previous.wait_finished().await;
        }

        Ok(SpliceOutcome::Applied { generation })
    }

    /// Stop playback after a failed splice and report why
    fn fail_splice(&self, state: &mut PlaybackState, effect: &str, failure: Error) -> Error {
        error!("Splice of {} failed, stopping playback: {}", effect, failure);
        state.halt();
        state.last_error = Some(failure.to_string());

        self.inner.shared.broadcast_event(RadioEvent::SpliceFailed {
            effect: effect.to_string(),
            error: failure.to_string(),
            timestamp: chrono::Utc::now(),
        });
        failure
    }

    /// Current playback snapshot
    pub async fn snapshot(&self) -> PlaybackSnapshot {
        let mut state = self.lock_state().await;
        self.refresh(&mut state);

        PlaybackSnapshot {
            status: state.status,
            song: state.song.as_ref().map(|song| song.display().to_string()),
            bytes_per_second: state.bytes_per_second,
            pacer_id: state.pacer.as_ref().map(Pacer::id),
            session: state.session,
            generation: state.generation,
            listeners: self.inner.registry.listener_count(),
            producers: self.inner.registry.producer_count(),
            last_error: state.last_error.clone(),
        }
    }

    pub async fn status(&self) -> PlaybackStatus {
        let mut state = self.lock_state().await;
        self.refresh(&mut state);
        state.status
    }

    /// The pacer currently feeding the broadcaster
    pub async fn active_pacer(&self) -> Option<Pacer> {
        self.lock_state().await.pacer.clone()
    }

    async fn lock_state(&self) -> MutexGuard<'_, PlaybackState> {
        self.inner.state.lock().await
    }

    fn refresh(&self, state: &mut PlaybackState) {
        if let Some(status) = state.refresh() {
            self.announce_end(&status);
        }
    }

    /// Reconcile the state machine once `pacer` terminates on its own
    fn watch_pacer(&self, pacer: Pacer) {
        let orchestrator: Weak<OrchestratorInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let status = pacer.wait_finished().await;
            let Some(inner) = orchestrator.upgrade() else {
                return;
            };
            let orchestrator = Orchestrator { inner };
            let mut state = orchestrator.lock_state().await;
            if state.reconcile(pacer.id(), &status) {
                drop(state);
                orchestrator.announce_end(&status);
            }
        });
    }

    fn announce_end(&self, status: &PacerStatus) {
        let reason = match status {
            PacerStatus::Failed(message) => {
                warn!("Playback stopped by stream failure: {}", message);
                format!("failed: {}", message)
            }
            _ => {
                info!("Playback reached end of song");
                "finished".to_string()
            }
        };
        self.inner
            .shared
            .broadcast_event(RadioEvent::playback_stopped(reason));
    }
}

fn effect_label(effect: &Path) -> String {
    effect
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| effect.display().to_string())
}
