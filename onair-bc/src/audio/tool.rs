//! External audio tool adapter
//!
//! Every probe and every mix spawns exactly one process of the configured
//! command-line tool (sox by default) with all three standard streams piped.
//! The caller owns the returned [`ToolProcess`] and is responsible for
//! consuming or closing its endpoints. A spawn failure is reported as
//! [`Error::ToolUnavailable`] immediately; there is no retry.

use crate::error::{Error, Result};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::debug;

/// Writable endpoint feeding the tool's standard input
pub type ToolInput = Box<dyn AsyncWrite + Send + Unpin>;

/// Readable endpoint draining the tool's standard output or error
pub type ToolOutput = Box<dyn AsyncRead + Send + Unpin>;

/// Something that can run the external audio tool
///
/// Implemented by [`SoxTool`] for real processes; tests substitute scripted
/// pipes through [`ToolProcess::from_pipes`].
pub trait AudioTool: Send + Sync {
    /// Spawn one process with `args`
    fn run(&self, args: &[String]) -> Result<ToolProcess>;
}

/// A running tool invocation and its pipe endpoints
///
/// When backed by a real process the child is spawned with kill-on-drop, so
/// dropping the handle (or the [`Child`] taken from it) never leaks the
/// process, whichever exit path the caller takes.
pub struct ToolProcess {
    pub stdin: Option<ToolInput>,
    pub stdout: ToolOutput,
    pub stderr: ToolOutput,
    child: Option<Child>,
}

impl ToolProcess {
    /// Wrap a spawned child, taking ownership of its piped streams
    pub fn from_child(mut child: Child) -> Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ToolUnavailable("stdout was not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ToolUnavailable("stderr was not piped".to_string()))?;
        let stdin = child.stdin.take().map(|s| Box::new(s) as ToolInput);

        Ok(Self {
            stdin,
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            child: Some(child),
        })
    }

    /// Build a process handle from bare pipes (no child to wait on)
    pub fn from_pipes(stdin: Option<ToolInput>, stdout: ToolOutput, stderr: ToolOutput) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
            child: None,
        }
    }

    /// Take the child so its exit status can be awaited separately
    pub fn take_child(&mut self) -> Option<Child> {
        self.child.take()
    }
}

/// Runs the tool as a real subprocess
#[derive(Debug, Clone)]
pub struct SoxTool {
    program: String,
}

impl SoxTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl AudioTool for SoxTool {
    fn run(&self, args: &[String]) -> Result<ToolProcess> {
        debug!(program = %self.program, ?args, "Spawning audio tool");

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ToolUnavailable(format!("{}: {}", self.program, e)))?;

        ToolProcess::from_child(child)
    }
}
