//! Command controller
//!
//! Turns operator command strings into orchestrator calls. `start` and
//! `stop` complete before the command is acknowledged; an effect is
//! resolved to a file, handed to the orchestrator and acknowledged as soon
//! as the splice has been accepted.

use crate::effects::EffectLibrary;
use crate::error::{Error, Result};
use crate::playback::Orchestrator;
use std::path::PathBuf;
use tracing::info;

/// A parsed operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    /// Anything else names an effect
    Effect(String),
}

impl Command {
    /// Parse a raw command
    ///
    /// Lowercased first; any text containing `start` is [`Command::Start`],
    /// otherwise any containing `stop` is [`Command::Stop`].
    pub fn parse(raw: &str) -> Result<Self> {
        let token = raw.trim().to_lowercase();
        if token.is_empty() {
            return Err(Error::BadRequest("command must not be empty".to_string()));
        }

        if token.contains("start") {
            Ok(Command::Start)
        } else if token.contains("stop") {
            Ok(Command::Stop)
        } else {
            Ok(Command::Effect(token))
        }
    }
}

/// What a handled command did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Started { session: u64 },
    /// `was_playing` is false when stop found nothing to stop
    Stopped { was_playing: bool },
    EffectQueued { effect: PathBuf, generation: u64 },
}

#[derive(Clone)]
pub struct RadioController {
    orchestrator: Orchestrator,
    effects: EffectLibrary,
}

impl RadioController {
    pub fn new(orchestrator: Orchestrator, effects: EffectLibrary) -> Self {
        Self {
            orchestrator,
            effects,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn effects(&self) -> &EffectLibrary {
        &self.effects
    }

    pub async fn handle_command(&self, raw: &str) -> Result<CommandOutcome> {
        let command = Command::parse(raw)?;
        info!("Handling command {:?}", command);

        match command {
            Command::Start => {
                let session = self.orchestrator.start().await?;
                Ok(CommandOutcome::Started { session })
            }
            Command::Stop => {
                let was_playing = self.orchestrator.stop().await;
                Ok(CommandOutcome::Stopped { was_playing })
            }
            Command::Effect(name) => {
                let effect = self.effects.resolve(&name).await?;
                let splice = self.orchestrator.append_effect(effect.clone()).await?;
                Ok(CommandOutcome::EffectQueued {
                    effect,
                    generation: splice.generation(),
                })
            }
        }
    }
}
