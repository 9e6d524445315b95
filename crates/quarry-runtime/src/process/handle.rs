//! Thin wrapper around the daemon's OS child process.
//!
//! `ProcessHandle` owns the `Child` and its stdout/stderr reader tasks.
//! The readers hold the only senders of the output channel, so receivers
//! see it close once both pipes reach EOF. It has no policy: the
//! supervisor decides when to launch, wait, or terminate.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use quarry_core::{DaemonFailure, DaemonLogSinkPort, OutputStream, SupervisorSettings, Target};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use super::exit::describe_exit;
use super::shutdown::shutdown_child;
use super::stream::{LineOutlets, spawn_stream_reader};
use super::tail::StderrTail;

/// Capacity of the per-process output broadcast channel.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// How long to wait for reader tasks to drain after the child exits.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// What to run: executable, fully rendered arguments, and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The launch for `target` under `settings`.
    pub fn for_target(settings: &SupervisorSettings, target: &Target) -> Self {
        Self {
            executable: settings.executable.clone(),
            args: settings.render_args(target),
            env: settings.env.clone(),
        }
    }
}

/// A line of daemon output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

/// A launched daemon process.
///
/// Dropping the handle aborts the output readers (closing the pipes) and,
/// through `kill_on_drop`, kills a child that was never terminated.
pub struct ProcessHandle {
    child: Child,
    pid: u32,
    /// Receiver created before the readers started, so the first
    /// subscriber cannot miss early lines.
    first_output: Option<broadcast::Receiver<OutputLine>>,
    /// Kept only to resubscribe; holding it does not keep the channel open.
    output: broadcast::Receiver<OutputLine>,
    stderr_tail: StderrTail,
    readers: Vec<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Launch `spec` with piped output.
    ///
    /// Must be called from within a tokio runtime; the output readers are
    /// spawned as tasks.
    pub fn launch(
        spec: &LaunchSpec,
        stderr_tail_lines: usize,
        sink: Option<Arc<dyn DaemonLogSinkPort>>,
    ) -> Result<Self, DaemonFailure> {
        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| launch_failure(&spec.executable, &e))?;

        let Some(pid) = child.id() else {
            return Err(DaemonFailure::LaunchFailure {
                executable: spec.executable.display().to_string(),
                reason: "process exited before its PID could be read".to_string(),
            });
        };

        info!(
            pid,
            executable = %spec.executable.display(),
            args = ?spec.args,
            "Daemon process launched"
        );

        let (output_tx, first_output) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        let output = first_output.resubscribe();
        let stderr_tail = StderrTail::new(stderr_tail_lines);
        let outlets = LineOutlets {
            lines: output_tx,
            stderr_tail: stderr_tail.clone(),
            sink,
        };

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_stream_reader(
                stdout,
                pid,
                OutputStream::Stdout,
                outlets.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_stream_reader(
                stderr,
                pid,
                OutputStream::Stderr,
                outlets,
            ));
        }

        Ok(Self {
            child,
            pid,
            first_output: Some(first_output),
            output,
            stderr_tail,
            readers,
        })
    }

    /// OS process identifier.
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Receive the daemon's output lines.
    ///
    /// The first call returns a receiver that has seen every line since
    /// launch; later calls only see lines emitted after subscribing. The
    /// receiver reports `Closed` once the process has closed both pipes.
    pub fn subscribe_output(&mut self) -> broadcast::Receiver<OutputLine> {
        self.first_output
            .take()
            .unwrap_or_else(|| self.output.resubscribe())
    }

    /// Whether the process is still running (never blocks).
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for the process to exit.
    ///
    /// Cancel-safe: dropping the future leaves the process untouched, and
    /// once it has exited repeated calls return the same status.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Request graceful termination, escalating to a forced kill after
    /// `grace`, and reap the process. Output readers are released afterwards.
    pub async fn terminate(&mut self, grace: Duration) -> io::Result<ExitStatus> {
        debug!(pid = self.pid, grace_ms = grace.as_millis(), "Terminating daemon");
        let result = shutdown_child(&mut self.child, grace).await;
        self.release_streams();
        result
    }

    /// Trailing stderr lines captured so far.
    pub fn stderr_tail(&self) -> Option<String> {
        self.stderr_tail.snapshot()
    }

    /// Classify an exit the supervisor did not ask for.
    ///
    /// Gives the readers a moment to drain the pipes so the last stderr
    /// lines make it into the diagnostic.
    pub async fn unexpected_exit(&mut self, status: ExitStatus) -> DaemonFailure {
        self.drain_streams().await;
        DaemonFailure::UnexpectedExit {
            status: describe_exit(status),
            stderr_tail: self.stderr_tail(),
        }
    }

    async fn drain_streams(&mut self) {
        for mut reader in self.readers.drain(..) {
            if timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader).await.is_err() {
                // A grandchild may still hold the pipe open
                reader.abort();
            }
        }
    }

    fn release_streams(&mut self) {
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.release_streams();
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

fn launch_failure(executable: &Path, error: &io::Error) -> DaemonFailure {
    let reason = match error.kind() {
        io::ErrorKind::NotFound => format!("executable not found ({error})"),
        io::ErrorKind::PermissionDenied => format!("permission denied, is it executable? ({error})"),
        _ => error.to_string(),
    };
    DaemonFailure::LaunchFailure {
        executable: executable.display().to_string(),
        reason,
    }
}
