//! Bit rate prober
//!
//! Asks the audio tool for a file's encoding bit rate (`--i -B <path>`).
//! The tool answers on stdout with values such as `128k` or `1.41M`; any
//! byte on stderr means the probe failed. Probing is never fatal to
//! playback: [`BitrateProber::probe_or_fallback`] substitutes the configured
//! fallback for every failure, including a probe that takes too long.

use crate::audio::tool::{AudioTool, ToolOutput};
use crate::error::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Size of the single chunk read from each channel
const FIRST_CHUNK_SIZE: usize = 1024;

/// Probes encoding bit rates via the external audio tool
#[derive(Clone)]
pub struct BitrateProber {
    tool: Arc<dyn AudioTool>,
    fallback_bit_rate: u64,
    timeout: Duration,
}

impl BitrateProber {
    pub fn new(tool: Arc<dyn AudioTool>, fallback_bit_rate: u64, timeout: Duration) -> Self {
        Self {
            tool,
            fallback_bit_rate,
            timeout,
        }
    }

    /// Arguments passed to the tool for inspection
    pub fn probe_args(path: &Path) -> Vec<String> {
        vec![
            "--i".to_string(),
            "-B".to_string(),
            path.to_string_lossy().into_owned(),
        ]
    }

    /// Probe `path`, returning bits per second
    ///
    /// Waits for the first chunk (or end of stream) on both stdout and
    /// stderr rather than draining either. Anything on stderr fails the
    /// probe with [`Error::Probe`].
    pub async fn probe(&self, path: &Path) -> Result<u64> {
        let mut process = self.tool.run(&Self::probe_args(path))?;

        let (stdout, stderr) = tokio::join!(
            read_first_chunk(&mut process.stdout),
            read_first_chunk(&mut process.stderr),
        );
        let (stdout, stderr) = (stdout?, stderr?);

        if !stderr.is_empty() {
            return Err(Error::Probe(String::from_utf8_lossy(&stderr).trim().to_string()));
        }

        parse_bit_rate(&String::from_utf8_lossy(&stdout))
    }

    /// Probe `path`, falling back to the configured bit rate on any failure
    pub async fn probe_or_fallback(&self, path: &Path) -> u64 {
        match tokio::time::timeout(self.timeout, self.probe(path)).await {
            Ok(Ok(bit_rate)) => {
                debug!("Probed {} at {} bits/s", path.display(), bit_rate);
                bit_rate
            }
            Ok(Err(e)) => {
                warn!(
                    "Bit rate probe for {} failed ({}), using fallback {} bits/s",
                    path.display(),
                    e,
                    self.fallback_bit_rate
                );
                self.fallback_bit_rate
            }
            Err(_) => {
                warn!(
                    "Bit rate probe for {} timed out after {:?}, using fallback {} bits/s",
                    path.display(),
                    self.timeout,
                    self.fallback_bit_rate
                );
                self.fallback_bit_rate
            }
        }
    }
}

/// Read whatever the channel produces first; empty at end of stream
async fn read_first_chunk(channel: &mut ToolOutput) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; FIRST_CHUNK_SIZE];
    let n = channel.read(&mut buf).await?;
    buf.truncate(n);
    Ok(buf)
}

/// Parse tool output such as `"64k\n"` into bits per second
///
/// A trailing `k` multiplies by 1 000 and `M` by 1 000 000; fractional
/// values (`1.41M`) are rounded to the nearest bit.
pub fn parse_bit_rate(raw: &str) -> Result<u64> {
    let trimmed = raw.trim();
    let (number, multiplier) = match trimmed.char_indices().last() {
        Some((idx, 'k')) | Some((idx, 'K')) => (&trimmed[..idx], 1_000.0),
        Some((idx, 'M')) => (&trimmed[..idx], 1_000_000.0),
        _ => (trimmed, 1.0),
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| Error::Probe(format!("unparsable bit rate {:?}", trimmed)))?;

    if !value.is_finite() || value <= 0.0 {
        return Err(Error::Probe(format!("invalid bit rate {:?}", trimmed)));
    }

    Ok((value * multiplier).round() as u64)
}
