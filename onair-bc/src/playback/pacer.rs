//! Pacer - rate-limited relay
//!
//! Re-emits bytes from an attached source into a [`FanoutSink`] so that
//! long-run throughput matches the song's real-time byte rate. Time is cut
//! into `ticks_per_second` slices. Every tick earns `bytes_per_second`
//! credit in units of 1/`ticks_per_second` byte, and whole bytes of credit
//! are released, so the bytes emitted over N ticks never exceed
//! `N * bytes_per_second / ticks_per_second`, including rates below one
//! byte per tick. The pacer only pulls from its source when it has room for
//! the next slice, so the source sees backpressure at the paced rate.
//!
//! Each pacer runs as its own task and is driven through a command channel.
//! The source is owned by that task, so it can only ever be attached to one
//! pacer: [`Pacer::detach`] resolves with the source once the task has
//! actually let go of it, never on pause alone.

use crate::audio::source::{self, AudioSource};
use crate::broadcast::FanoutSink;
use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

static NEXT_PACER_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a pacer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacerStatus {
    /// Running, nothing attached yet
    Waiting,
    /// Source attached, emitting
    Running,
    Paused,
    /// Source exhausted and every byte emitted
    Finished,
    /// Terminated by [`Pacer::end`]
    Ended,
    /// Source read failed; message of the read error
    Failed(String),
}

impl PacerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PacerStatus::Finished | PacerStatus::Ended | PacerStatus::Failed(_)
        )
    }
}

/// A source handed back by a paused pacer
///
/// `buffered` holds bytes the pacer had already pulled but not emitted.
pub struct DetachedSource {
    pub source: AudioSource,
    pub buffered: Bytes,
}

impl DetachedSource {
    /// The source with the unsent bytes put back in front
    pub fn into_source(self) -> AudioSource {
        source::prepend(self.buffered, self.source)
    }
}

enum PacerCommand {
    Attach(AudioSource, oneshot::Sender<Result<()>>),
    Pause,
    Resume,
    Detach(oneshot::Sender<DetachedSource>),
    End,
}

/// Handle to a running pacer task
#[derive(Clone, Debug)]
pub struct Pacer {
    id: u64,
    bytes_per_second: u64,
    chunk_budget: usize,
    commands: mpsc::UnboundedSender<PacerCommand>,
    status: watch::Receiver<PacerStatus>,
}

impl Pacer {
    /// Spawn a pacer emitting into `sink` at `bytes_per_second`
    ///
    /// The pacer starts with nothing attached; it holds its place on the
    /// fan-out sink until a source is attached or it is ended.
    pub fn spawn(bytes_per_second: u64, ticks_per_second: u32, sink: FanoutSink) -> Self {
        let ticks = ticks_per_second.max(1);
        let chunk_budget = bytes_per_second.div_ceil(u64::from(ticks)).max(1) as usize;
        let id = NEXT_PACER_ID.fetch_add(1, Ordering::Relaxed);

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(PacerStatus::Waiting);

        let task = PacerTask {
            id,
            commands: command_rx,
            sink,
            status: status_tx,
            tick: Duration::from_secs(1) / ticks,
            ticks_per_second: u64::from(ticks),
            bytes_per_second,
            credit: 0,
            chunk_budget,
            source: None,
            pending: BytesMut::with_capacity(chunk_budget),
            paused: false,
            exhausted: false,
            bytes_emitted: 0,
        };
        tokio::spawn(task.run());

        debug!(
            "Pacer {} spawned at {} bytes/s ({} bytes per tick)",
            id, bytes_per_second, chunk_budget
        );

        Self {
            id,
            bytes_per_second,
            chunk_budget,
            commands,
            status,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }

    /// Maximum bytes released in a single tick
    pub fn chunk_budget(&self) -> usize {
        self.chunk_budget
    }

    /// Attach `source` as this pacer's producer
    ///
    /// A pacer takes one source at a time; attaching while another is
    /// attached is refused and the new source is dropped.
    pub async fn attach(&self, source: AudioSource) -> Result<()> {
        let (reply, accepted) = oneshot::channel();
        self.commands
            .send(PacerCommand::Attach(source, reply))
            .map_err(|_| self.gone())?;
        accepted.await.map_err(|_| self.gone())?
    }

    fn gone(&self) -> Error {
        Error::Playback(format!("pacer {} has ended", self.id))
    }

    /// Stop pulling and emitting until resumed
    pub fn pause(&self) {
        let _ = self.commands.send(PacerCommand::Pause);
    }

    pub fn resume(&self) {
        let _ = self.commands.send(PacerCommand::Resume);
    }

    /// Ask the pacer to hand back its source
    ///
    /// The receiver resolves once the task has released the source. It
    /// fails if nothing was attached or the pacer terminated first.
    pub fn detach(&self) -> oneshot::Receiver<DetachedSource> {
        let (reply, confirmation) = oneshot::channel();
        let _ = self.commands.send(PacerCommand::Detach(reply));
        confirmation
    }

    /// Terminate regardless of the source's state; no-op once terminated
    pub fn end(&self) {
        if self.status().is_terminal() {
            return;
        }
        let _ = self.commands.send(PacerCommand::End);
    }

    pub fn status(&self) -> PacerStatus {
        self.status.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        !self.status().is_terminal()
    }

    /// Wait until the task has terminated and released its fan-out sink
    pub async fn wait_finished(&self) -> PacerStatus {
        let mut status = self.status.clone();
        let terminal = match status.wait_for(PacerStatus::is_terminal).await {
            Ok(current) => current.clone(),
            Err(_) => PacerStatus::Ended,
        };
        terminal
    }
}

struct PacerTask {
    id: u64,
    commands: mpsc::UnboundedReceiver<PacerCommand>,
    sink: FanoutSink,
    status: watch::Sender<PacerStatus>,
    tick: Duration,
    ticks_per_second: u64,
    bytes_per_second: u64,
    /// Unspent credit, in 1/`ticks_per_second` bytes
    credit: u64,
    chunk_budget: usize,
    source: Option<AudioSource>,
    pending: BytesMut,
    paused: bool,
    exhausted: bool,
    bytes_emitted: u64,
}

impl PacerTask {
    async fn run(mut self) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            let room = self.chunk_budget.saturating_sub(self.pending.len());
            let can_read =
                !self.paused && !self.exhausted && self.source.is_some() && room > 0;
            let can_emit = !self.paused && !self.pending.is_empty();

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Some(outcome) = self.handle(command) {
                            break outcome;
                        }
                    }
                    None => break PacerStatus::Ended,
                },

                read = read_some(&mut self.source, &mut self.pending, room), if can_read => {
                    match read {
                        Ok(0) => self.exhausted = true,
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Pacer {} source failed: {}", self.id, e);
                            break PacerStatus::Failed(e.to_string());
                        }
                    }
                }

                _ = ticker.tick(), if can_emit => self.emit_tick(),
            }

            if self.exhausted && self.pending.is_empty() {
                break PacerStatus::Finished;
            }
        };

        let PacerTask {
            id,
            commands,
            sink,
            status,
            source,
            bytes_emitted,
            ..
        } = self;
        drop(commands);
        drop(source);
        drop(sink);

        info!(
            "Pacer {} stopped ({:?}) after emitting {} bytes",
            id, outcome, bytes_emitted
        );
        status.send_replace(outcome);
    }

    /// Apply a command; `Some` terminates the task with that status
    fn handle(&mut self, command: PacerCommand) -> Option<PacerStatus> {
        match command {
            PacerCommand::Attach(source, reply) => {
                let accepted = if self.source.is_some() {
                    warn!(
                        "Pacer {} already has a source attached, refusing a second producer",
                        self.id
                    );
                    Err(Error::Playback(format!(
                        "pacer {} already has a source attached",
                        self.id
                    )))
                } else {
                    self.source = Some(source);
                    self.exhausted = false;
                    Ok(())
                };
                let _ = reply.send(accepted);
            }
            PacerCommand::Pause => self.paused = true,
            PacerCommand::Resume => self.paused = false,
            PacerCommand::Detach(reply) => match self.source.take() {
                Some(source) => {
                    let buffered = self.pending.split().freeze();
                    self.exhausted = false;
                    debug!(
                        "Pacer {} detached its source ({} unsent bytes handed back)",
                        self.id,
                        buffered.len()
                    );
                    if reply.send(DetachedSource { source, buffered }).is_err() {
                        debug!("Pacer {} detach confirmation was not awaited", self.id);
                    }
                }
                None => debug!("Pacer {} has no source to detach", self.id),
            },
            PacerCommand::End => return Some(PacerStatus::Ended),
        }

        self.publish();
        None
    }

    /// Release this tick's share of the pending bytes
    fn emit_tick(&mut self) {
        self.credit += self.bytes_per_second;
        let release = (self.credit / self.ticks_per_second).min(self.pending.len() as u64);
        // Credit a starved tick could not spend is not banked beyond one byte
        self.credit = (self.credit - release * self.ticks_per_second)
            .min(self.ticks_per_second - 1);
        if release == 0 {
            return;
        }

        let chunk = self.pending.split_to(release as usize).freeze();
        self.pending.reserve(self.chunk_budget);
        self.bytes_emitted += chunk.len() as u64;
        self.sink.write(chunk);
    }

    fn publish(&self) {
        let status = if self.paused {
            PacerStatus::Paused
        } else if self.source.is_some() {
            PacerStatus::Running
        } else {
            PacerStatus::Waiting
        };
        self.status.send_replace(status);
    }
}

/// Pull at most `room` bytes from the source into `pending`
///
/// Cancel safe: if another select branch wins, no bytes are lost.
async fn read_some(
    source: &mut Option<AudioSource>,
    pending: &mut BytesMut,
    room: usize,
) -> io::Result<usize> {
    match source.as_mut() {
        Some(source) => {
            let mut limited = BufMut::limit(&mut *pending, room);
            source.read_buf(&mut limited).await
        }
        None => std::future::pending().await,
    }
}
