//! Effect mixer
//!
//! Merges a short effect file into the live song by running the audio tool
//! in mix mode: the live source is piped into the tool's stdin while the tool
//! reads the effect straight from disk, each at its own volume. The tool's
//! stdout becomes the new source for the pacer.
//!
//! Feeding stdin and draining stdout are independent asynchronous copies.
//! A failure on either side (crashed process, broken pipe, non-zero exit, or
//! no output for longer than the stall timeout) surfaces as an
//! [`Error::MixFailure`] read error on the merged source, so the pacer stops
//! rather than broadcasting a half-mixed stream.

use crate::audio::source::AudioSource;
use crate::audio::tool::{AudioTool, ToolOutput};
use crate::config::AudioSettings;
use crate::error::{Error, Result};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::ExitStatus;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, ReadBuf};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tracing::{debug, warn};

/// One effect splice: the effect file plus the (detached) live source
pub struct MixRequest {
    pub effect: PathBuf,
    pub source: AudioSource,
}

impl MixRequest {
    pub fn new(effect: PathBuf, source: AudioSource) -> Self {
        Self { effect, source }
    }
}

/// Volume and format parameters for a mix
#[derive(Debug, Clone)]
pub struct MixSettings {
    pub media_type: String,
    pub song_volume: String,
    pub fx_volume: String,
    pub stall_timeout: Option<Duration>,
}

impl From<&AudioSettings> for MixSettings {
    fn from(audio: &AudioSettings) -> Self {
        Self {
            media_type: audio.media_type.clone(),
            song_volume: audio.song_volume.clone(),
            fx_volume: audio.fx_volume.clone(),
            stall_timeout: audio.mix_stall_timeout(),
        }
    }
}

/// Spawns mixing processes
#[derive(Clone)]
pub struct Mixer {
    tool: Arc<dyn AudioTool>,
    settings: MixSettings,
}

impl Mixer {
    pub fn new(tool: Arc<dyn AudioTool>, settings: MixSettings) -> Self {
        Self { tool, settings }
    }

    /// Tool arguments: song from stdin mixed (`-m`) with the effect file, to stdout
    pub fn mix_args(&self, effect: &Path) -> Vec<String> {
        let media_type = self.settings.media_type.clone();
        vec![
            "-t".to_string(),
            media_type.clone(),
            "-v".to_string(),
            self.settings.song_volume.clone(),
            "-m".to_string(),
            "-".to_string(),
            "-t".to_string(),
            media_type.clone(),
            "-v".to_string(),
            self.settings.fx_volume.clone(),
            effect.to_string_lossy().into_owned(),
            "-t".to_string(),
            media_type,
            "-".to_string(),
        ]
    }

    /// Start mixing and return the merged stream
    ///
    /// Spawn failures are returned directly; everything that goes wrong
    /// after the process is up is reported by reads on the merged source.
    pub fn merge(&self, request: MixRequest) -> Result<MixedSource> {
        let MixRequest { effect, source } = request;
        let mut process = self.tool.run(&self.mix_args(&effect))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::MixFailure("mixer stdin is not writable".to_string()))?;
        let child = process.take_child();

        let effect_name = effect.display().to_string();
        debug!("Mixing {} into live stream", effect_name);

        let feed = tokio::spawn(async move {
            let mut source = source;
            let mut stdin = stdin;
            let copied = tokio::io::copy(&mut source, &mut stdin).await?;
            stdin.shutdown().await?;
            Ok(copied)
        });

        let diagnostics = tokio::spawn(drain_diagnostics(process.stderr, effect_name));

        let exit = child.map(|mut child| tokio::spawn(async move { child.wait().await }));

        Ok(MixedSource {
            output: process.stdout,
            feed: Some(feed),
            exit,
            diagnostics,
            stall_timeout: self.settings.stall_timeout,
            stall: self
                .settings
                .stall_timeout
                .map(|timeout| Box::pin(tokio::time::sleep(timeout))),
            waiting: false,
            finished: false,
        })
    }
}

/// Log the tool's stderr; sox reports warnings there while mixing
async fn drain_diagnostics(stderr: ToolOutput, effect: String) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => debug!("mixer [{}]: {}", effect, line),
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                debug!("mixer [{}]: stderr closed: {}", effect, e);
                break;
            }
        }
    }
}

/// Output of a running mix
///
/// Owns the feeding task and the process: dropping the merged source aborts
/// the feed and kills the mixer.
pub struct MixedSource {
    output: ToolOutput,
    feed: Option<JoinHandle<io::Result<u64>>>,
    exit: Option<JoinHandle<io::Result<ExitStatus>>>,
    diagnostics: JoinHandle<()>,
    stall_timeout: Option<Duration>,
    stall: Option<Pin<Box<Sleep>>>,
    waiting: bool,
    finished: bool,
}

impl MixedSource {
    fn reset_stall(&mut self) {
        if let (Some(timeout), Some(stall)) = (self.stall_timeout, self.stall.as_mut()) {
            stall.as_mut().reset(Instant::now() + timeout);
        }
    }

    /// Output hit end of stream: confirm the feed and the process both succeeded
    fn poll_completion(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(mut feed) = self.feed.take() {
            match Pin::new(&mut feed).poll(cx) {
                Poll::Pending => {
                    self.feed = Some(feed);
                    return Poll::Pending;
                }
                Poll::Ready(Ok(Ok(copied))) => {
                    debug!("Mixer consumed {} bytes of live audio", copied)
                }
                Poll::Ready(Ok(Err(e))) => {
                    return Poll::Ready(Err(mix_error(format!("feeding mixer failed: {}", e))));
                }
                Poll::Ready(Err(e)) => {
                    return Poll::Ready(Err(mix_error(format!("mixer feed task failed: {}", e))));
                }
            }
        }

        if let Some(mut exit) = self.exit.take() {
            match Pin::new(&mut exit).poll(cx) {
                Poll::Pending => {
                    self.exit = Some(exit);
                    return Poll::Pending;
                }
                Poll::Ready(Ok(Ok(status))) if status.success() => {}
                Poll::Ready(Ok(Ok(status))) => {
                    return Poll::Ready(Err(mix_error(format!("mixer exited with {}", status))));
                }
                Poll::Ready(Ok(Err(e))) => {
                    return Poll::Ready(Err(mix_error(format!("waiting for mixer failed: {}", e))));
                }
                Poll::Ready(Err(e)) => {
                    return Poll::Ready(Err(mix_error(format!("mixer wait task failed: {}", e))));
                }
            }
        }

        self.finished = true;
        Poll::Ready(Ok(()))
    }
}

fn mix_error(message: String) -> io::Error {
    warn!("{}", message);
    io::Error::new(io::ErrorKind::BrokenPipe, Error::MixFailure(message))
}

impl AsyncRead for MixedSource {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        match Pin::new(&mut this.output).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if buf.filled().len() > before => {
                this.waiting = false;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Ok(())) => this.poll_completion(cx),
            Poll::Ready(Err(e)) => {
                Poll::Ready(Err(mix_error(format!("reading mixer output failed: {}", e))))
            }
            Poll::Pending => {
                // The stall clock runs from the first read that found no output
                if !this.waiting {
                    this.waiting = true;
                    this.reset_stall();
                }
                if let Some(stall) = this.stall.as_mut() {
                    if stall.as_mut().poll(cx).is_ready() {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            Error::MixFailure(format!(
                                "mixer produced no output for {:?}",
                                this.stall_timeout.unwrap_or_default()
                            )),
                        )));
                    }
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for MixedSource {
    fn drop(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.abort();
        }
        self.diagnostics.abort();
        // Aborting the wait task drops the child, which kills the process
        if let Some(exit) = self.exit.take() {
            exit.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tool::ToolProcess;
    use std::io::Cursor;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;

    /// Tool that copies stdin to stdout, like `cat`
    struct PassthroughTool {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl AudioTool for PassthroughTool {
        fn run(&self, args: &[String]) -> Result<ToolProcess> {
            self.calls.lock().unwrap().push(args.to_vec());
            let (input, output) = tokio::io::duplex(4096);
            Ok(ToolProcess::from_pipes(
                Some(Box::new(input)),
                Box::new(output),
                Box::new(tokio::io::empty()),
            ))
        }
    }

    /// Tool whose stdin rejects every write
    struct BrokenPipeTool;

    struct RejectingWriter;

    impl tokio::io::AsyncWrite for RejectingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "mixer went away")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl AudioTool for BrokenPipeTool {
        fn run(&self, _args: &[String]) -> Result<ToolProcess> {
            Ok(ToolProcess::from_pipes(
                Some(Box::new(RejectingWriter)),
                Box::new(tokio::io::empty()),
                Box::new(tokio::io::empty()),
            ))
        }
    }

    /// Reader that never yields data nor end of stream
    struct NeverReader;

    impl AsyncRead for NeverReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    /// Tool whose stdout never produces anything
    struct SilentTool;

    impl AudioTool for SilentTool {
        fn run(&self, _args: &[String]) -> Result<ToolProcess> {
            Ok(ToolProcess::from_pipes(
                Some(Box::new(tokio::io::sink())),
                Box::new(NeverReader),
                Box::new(tokio::io::empty()),
            ))
        }
    }

    /// Runs a shell script as the mixer, ignoring the mix arguments
    #[cfg(unix)]
    struct ShellTool(&'static str);

    #[cfg(unix)]
    impl AudioTool for ShellTool {
        fn run(&self, _args: &[String]) -> Result<ToolProcess> {
            use std::process::Stdio;

            let child = tokio::process::Command::new("sh")
                .args(["-c", self.0])
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;
            ToolProcess::from_child(child)
        }
    }

    fn settings(stall_timeout: Option<Duration>) -> MixSettings {
        MixSettings {
            media_type: "mp3".to_string(),
            song_volume: "0.99".to_string(),
            fx_volume: "0.1".to_string(),
            stall_timeout,
        }
    }

    fn song(bytes: &[u8]) -> AudioSource {
        Box::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn test_mix_args_order() {
        let mixer = Mixer::new(
            Arc::new(PassthroughTool { calls: Mutex::new(Vec::new()) }),
            settings(None),
        );
        let args = mixer.mix_args(Path::new("fx/applause.mp3"));

        assert_eq!(
            args,
            vec![
                "-t", "mp3", "-v", "0.99", "-m", "-", "-t", "mp3", "-v", "0.1",
                "fx/applause.mp3", "-t", "mp3", "-",
            ]
        );
    }

    #[tokio::test]
    async fn test_merge_pipes_live_source_through_tool() {
        let tool = Arc::new(PassthroughTool { calls: Mutex::new(Vec::new()) });
        let mixer = Mixer::new(tool.clone(), settings(Some(Duration::from_secs(5))));

        let mut merged = mixer
            .merge(MixRequest::new(PathBuf::from("fx/boo.mp3"), song(b"live song bytes")))
            .unwrap();

        let mut out = Vec::new();
        merged.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"live song bytes");
        assert_eq!(tool.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_feed_surfaces_as_mix_failure() {
        let mixer = Mixer::new(Arc::new(BrokenPipeTool), settings(None));
        let mut merged = mixer
            .merge(MixRequest::new(PathBuf::from("fx/boo.mp3"), song(b"live")))
            .unwrap();

        let mut out = Vec::new();
        let err = merged.read_to_end(&mut out).await.unwrap_err();

        assert!(err.to_string().contains("Mix failure"), "got: {}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_mixer_times_out() {
        let mixer = Mixer::new(Arc::new(SilentTool), settings(Some(Duration::from_millis(200))));
        let mut merged = mixer
            .merge(MixRequest::new(PathBuf::from("fx/boo.mp3"), song(b"")))
            .unwrap();

        let mut buf = [0u8; 16];
        let err = merged.read(&mut buf).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_surfaces_as_mix_failure() {
        let mixer = Mixer::new(Arc::new(ShellTool("cat; exit 3")), settings(None));
        let mut merged = mixer
            .merge(MixRequest::new(PathBuf::from("fx/boo.mp3"), song(b"abc")))
            .unwrap();

        let mut out = Vec::new();
        let err = merged.read_to_end(&mut out).await.unwrap_err();

        assert_eq!(out, b"abc");
        assert!(err.to_string().contains("mixer exited with"), "got: {}", err);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_ends_merged_stream() {
        let mixer = Mixer::new(Arc::new(ShellTool("cat")), settings(None));
        let mut merged = mixer
            .merge(MixRequest::new(PathBuf::from("fx/boo.mp3"), song(b"live")))
            .unwrap();

        let mut out = Vec::new();
        merged.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"live");
    }
}
