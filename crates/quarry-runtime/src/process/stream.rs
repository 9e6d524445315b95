//! Async stream log readers (non-UTF8-safe).
//!
//! The daemon may emit non-UTF8 bytes on stdout/stderr. Using
//! `BufReader::lines()` would terminate the reader task on invalid UTF-8,
//! so lines are read as bytes and decoded lossily.

use std::sync::Arc;

use quarry_core::{DaemonLogSinkPort, OutputStream};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use super::handle::OutputLine;
use super::tail::StderrTail;

/// Where a reader delivers each decoded line.
#[derive(Clone)]
pub(crate) struct LineOutlets {
    pub(crate) lines: broadcast::Sender<OutputLine>,
    pub(crate) stderr_tail: StderrTail,
    pub(crate) sink: Option<Arc<dyn DaemonLogSinkPort>>,
}

/// Spawn a task that reads `stream` to EOF, fanning every line out to `outlets`.
///
/// The task owns the pipe; the descriptor is closed when it finishes or is aborted.
pub(crate) fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    pid: u32,
    kind: OutputStream,
    outlets: LineOutlets,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    // Trim trailing newline(s)
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }

                    let line = String::from_utf8_lossy(&buf).into_owned();
                    debug!(pid, stream = %kind, "{line}");

                    if kind == OutputStream::Stderr {
                        outlets.stderr_tail.push(line.clone());
                    }
                    if let Some(sink) = &outlets.sink {
                        sink.append(pid, kind, line.clone());
                    }
                    // No receivers is fine: nobody is probing right now
                    let _ = outlets.lines.send(OutputLine { stream: kind, line });
                }
                Err(e) => {
                    debug!(pid, stream = %kind, error = %e, "Output reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(pid, stream = %kind, "Output reader task exiting");
    })
}
