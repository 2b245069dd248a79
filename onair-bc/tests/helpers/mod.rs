//! Test helpers for onair-bc integration tests
//!
//! - FakeTool: scripted stand-in for the external audio tool
//! - Fixture: temporary root folder with a song, effects and static pages

#![allow(dead_code)]

use onair_bc::api::AppContext;
use onair_bc::audio::{AudioTool, ToolProcess};
use onair_bc::config::RadioConfig;
use onair_bc::playback::{Orchestrator, PlaybackStatus};
use onair_bc::{Error, Result};
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWrite;

/// What the fake tool does when asked to mix
#[derive(Debug, Clone, Copy)]
pub enum MixBehavior {
    /// Copy stdin to stdout unchanged
    Passthrough,
    /// Reject every write to stdin
    BrokenPipe,
    /// Fail to spawn
    Unavailable,
}

/// Scripted audio tool counting probe and mix invocations
pub struct FakeTool {
    probe_stdout: String,
    probe_stderr: String,
    mix: MixBehavior,
    probes: AtomicUsize,
    mixes: AtomicUsize,
    mix_calls: Mutex<Vec<Vec<String>>>,
}

impl FakeTool {
    pub fn new(probe_stdout: &str, mix: MixBehavior) -> Arc<Self> {
        Arc::new(Self {
            probe_stdout: probe_stdout.to_string(),
            probe_stderr: String::new(),
            mix,
            probes: AtomicUsize::new(0),
            mixes: AtomicUsize::new(0),
            mix_calls: Mutex::new(Vec::new()),
        })
    }

    /// A tool whose probes always complain on stderr
    pub fn failing_probe(mix: MixBehavior) -> Arc<Self> {
        Arc::new(Self {
            probe_stdout: String::new(),
            probe_stderr: "sox FAIL formats: can't open input file".to_string(),
            mix,
            probes: AtomicUsize::new(0),
            mixes: AtomicUsize::new(0),
            mix_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn mix_count(&self) -> usize {
        self.mixes.load(Ordering::SeqCst)
    }

    pub fn mix_calls(&self) -> Vec<Vec<String>> {
        self.mix_calls.lock().unwrap().clone()
    }
}

impl AudioTool for FakeTool {
    fn run(&self, args: &[String]) -> Result<ToolProcess> {
        if args.first().map(String::as_str) == Some("--i") {
            self.probes.fetch_add(1, Ordering::SeqCst);
            return Ok(ToolProcess::from_pipes(
                None,
                Box::new(Cursor::new(self.probe_stdout.clone().into_bytes())),
                Box::new(Cursor::new(self.probe_stderr.clone().into_bytes())),
            ));
        }

        self.mixes.fetch_add(1, Ordering::SeqCst);
        self.mix_calls.lock().unwrap().push(args.to_vec());

        match self.mix {
            MixBehavior::Passthrough => {
                let (input, output) = tokio::io::duplex(64 * 1024);
                Ok(ToolProcess::from_pipes(
                    Some(Box::new(input)),
                    Box::new(output),
                    Box::new(tokio::io::empty()),
                ))
            }
            MixBehavior::BrokenPipe => Ok(ToolProcess::from_pipes(
                Some(Box::new(RejectingWriter)),
                Box::new(tokio::io::empty()),
                Box::new(tokio::io::empty()),
            )),
            MixBehavior::Unavailable => {
                Err(Error::ToolUnavailable("sox: No such file or directory".to_string()))
            }
        }
    }
}

struct RejectingWriter;

impl AsyncWrite for RejectingWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "mixer exited")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Temporary root folder laid out like a deployment
pub struct Fixture {
    pub dir: TempDir,
    pub config: RadioConfig,
    pub song: Vec<u8>,
}

impl Fixture {
    /// Root folder holding `song.mp3` with `song_len` patterned bytes
    pub fn new(song_len: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let song: Vec<u8> = (0..song_len).map(|i| (i % 251) as u8).collect();
        std::fs::create_dir_all(root.join("audio/songs")).unwrap();
        std::fs::write(root.join("audio/songs/song.mp3"), &song).unwrap();

        std::fs::create_dir_all(root.join("audio/fx")).unwrap();
        std::fs::write(root.join("audio/fx/Applause.mp3"), b"clap clap").unwrap();
        std::fs::write(root.join("audio/fx/boo.mp3"), b"boooo").unwrap();

        std::fs::create_dir_all(root.join("public/home")).unwrap();
        std::fs::create_dir_all(root.join("public/controller")).unwrap();
        std::fs::create_dir_all(root.join("public/css")).unwrap();
        std::fs::write(root.join("public/home/index.html"), "<h1>OnAir</h1>").unwrap();
        std::fs::write(
            root.join("public/controller/index.html"),
            "<h1>OnAir Controller</h1>",
        )
        .unwrap();
        std::fs::write(root.join("public/css/style.css"), "body { margin: 0; }").unwrap();

        let mut config = RadioConfig::default();
        config.paths.song = "audio/songs/song.mp3".into();
        config.resolve_paths(root);

        Self { dir, config, song }
    }

    pub fn app_context(&self, tool: Arc<FakeTool>) -> AppContext {
        onair_bc::build_app_context(&self.config, tool)
    }

    pub fn orchestrator(&self, tool: Arc<FakeTool>) -> Orchestrator {
        self.app_context(tool).controller.orchestrator().clone()
    }

    pub fn fx_path(&self, file_name: &str) -> std::path::PathBuf {
        self.config.paths.fx_dir.join(file_name)
    }
}

/// Poll until the orchestrator reaches `status`, panicking after `timeout`
pub async fn wait_for_status(orchestrator: &Orchestrator, status: PlaybackStatus, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if orchestrator.status().await == status {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "orchestrator never reached {:?}: {:?}",
                status,
                orchestrator.snapshot().await
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until exactly `count` pacers feed the registry
pub async fn wait_for_producers(orchestrator: &Orchestrator, count: usize, timeout: Duration) {
    let registry = orchestrator.registry();
    let settled = tokio::time::timeout(timeout, async {
        while registry.producer_count() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(
        settled.is_ok(),
        "expected {} producers, found {}",
        count,
        registry.producer_count()
    );
}
