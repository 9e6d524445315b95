//! Daemon log sink port for capturing subprocess output.
//!
//! The supervisor forwards every stdout/stderr line of the daemon to an
//! optional sink, so front ends can keep their own log view without
//! reaching into the process handle.

use std::fmt;

/// Which output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Port for appending daemon log lines to a sink.
///
/// Called from stream reader tasks; implementations must not block.
pub trait DaemonLogSinkPort: Send + Sync {
    /// Append a line (without trailing newline) emitted by process `pid`.
    fn append(&self, pid: u32, stream: OutputStream, line: String);
}
