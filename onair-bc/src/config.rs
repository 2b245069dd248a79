//! Configuration for the onair-bc broadcast service
//!
//! Loaded from TOML (see [`onair_common::config::load_toml_file`]); every key
//! is optional and falls back to the built-in default below. Relative paths
//! are resolved against the root folder by [`RadioConfig::resolve_paths`].
//!
//! ```toml
//! port = 3000
//!
//! [paths]
//! public_dir = "public"
//! song = "audio/songs/conversation.mp3"
//! fx_dir = "audio/fx"
//!
//! [audio]
//! tool_program = "sox"
//! fallback_bit_rate = 128000
//! bit_rate_divisor = 8
//! ```

use crate::error::{Error, Result};
use onair_common::config::{resolve_relative, LoggingConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// HTTP server port
    pub port: u16,

    /// Root folder for relative paths (optional, see RootFolderResolver)
    pub root_folder: Option<PathBuf>,

    pub paths: PathSettings,
    pub audio: AudioSettings,
    pub pacing: PacingSettings,
    pub listeners: ListenerSettings,
    pub logging: LoggingConfig,
}

/// Filesystem locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Static pages and assets (`home/index.html`, `controller/index.html`)
    pub public_dir: PathBuf,
    /// The song broadcast on `start`
    pub song: PathBuf,
    /// Directory scanned for sound effects
    pub fx_dir: PathBuf,
}

/// External audio tool and mixing parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Program used for probing and mixing
    pub tool_program: String,
    /// File type passed to the tool for every track (`-t`)
    pub media_type: String,
    /// Volume of the live song in a mix (`-v`)
    pub song_volume: String,
    /// Volume of the effect in a mix (`-v`)
    pub fx_volume: String,
    /// Bits per second used when probing fails
    pub fallback_bit_rate: u64,
    /// Divides probed bits/s into the pacing rate in bytes/s
    pub bit_rate_divisor: u64,
    /// Upper bound on a single probe; exceeding it means fallback
    pub probe_timeout_ms: u64,
    /// Mixer silence tolerated before the merged stream fails (0 = unbounded)
    pub mix_stall_timeout_ms: u64,
}

/// Pacer granularity
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingSettings {
    /// Pacer ticks per second; each tick releases bytes_per_second / ticks
    pub ticks_per_second: u32,
}

/// Per-listener buffering
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerSettings {
    /// Chunks buffered per listener before deliveries to it are dropped
    pub buffer_chunks: usize,
    /// Consecutive dropped chunks after which a listener is disconnected
    pub max_lagged_chunks: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            root_folder: None,
            paths: PathSettings::default(),
            audio: AudioSettings::default(),
            pacing: PacingSettings::default(),
            listeners: ListenerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            public_dir: PathBuf::from("public"),
            song: PathBuf::from("audio/songs/conversation.mp3"),
            fx_dir: PathBuf::from("audio/fx"),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            tool_program: "sox".to_string(),
            media_type: "mp3".to_string(),
            song_volume: "0.99".to_string(),
            fx_volume: "0.1".to_string(),
            fallback_bit_rate: 128_000,
            bit_rate_divisor: 8,
            probe_timeout_ms: 5_000,
            mix_stall_timeout_ms: 10_000,
        }
    }
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            ticks_per_second: 10,
        }
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            buffer_chunks: 64,
            max_lagged_chunks: 32,
        }
    }
}

impl RadioConfig {
    /// Make every configured path absolute relative to `root`
    pub fn resolve_paths(&mut self, root: &Path) {
        self.root_folder = Some(root.to_path_buf());
        self.paths.public_dir = resolve_relative(root, &self.paths.public_dir);
        self.paths.song = resolve_relative(root, &self.paths.song);
        self.paths.fx_dir = resolve_relative(root, &self.paths.fx_dir);
    }

    /// Reject values that would make pacing or fan-out meaningless
    pub fn validate(&self) -> Result<()> {
        if self.audio.bit_rate_divisor == 0 {
            return Err(Error::Config("audio.bit_rate_divisor must be > 0".to_string()));
        }
        if self.pacing.ticks_per_second == 0 {
            return Err(Error::Config("pacing.ticks_per_second must be > 0".to_string()));
        }
        if self.listeners.buffer_chunks == 0 {
            return Err(Error::Config("listeners.buffer_chunks must be > 0".to_string()));
        }
        if self.audio.tool_program.trim().is_empty() {
            return Err(Error::Config("audio.tool_program must not be empty".to_string()));
        }
        Ok(())
    }
}

impl AudioSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// `None` when stall detection is disabled
    pub fn mix_stall_timeout(&self) -> Option<Duration> {
        (self.mix_stall_timeout_ms > 0).then(|| Duration::from_millis(self.mix_stall_timeout_ms))
    }
}
