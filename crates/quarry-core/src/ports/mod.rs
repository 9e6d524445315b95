//! Port definitions and error types shared by the supervisor and its adapters.
//!
//! # Design Rules
//!
//! - No tokio or OS process types in any signature
//! - Failures of the daemon are values (`DaemonFailure`), not API errors
//! - API errors (`SupervisorError`) only describe rejected requests

mod daemon_log_sink;
mod readiness;

use std::time::Duration;

use thiserror::Error;

use crate::settings::SettingsError;

pub use daemon_log_sink::{DaemonLogSinkPort, OutputStream};
pub use readiness::ReadinessOutcome;

/// Why a launch attempt or a running daemon failed.
///
/// All kinds surface to observers identically, as `DaemonState::Error`
/// carrying this value's display text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DaemonFailure {
    /// The executable is missing or could not be run.
    #[error("Failed to launch {executable}: {reason}")]
    LaunchFailure { executable: String, reason: String },

    /// The process stayed alive but never signaled readiness.
    #[error("Daemon did not become ready within {}", format_timeout(.timeout))]
    ReadinessTimeout { timeout: Duration },

    /// The process reported a failure while being probed.
    #[error("Daemon failed to start: {reason}")]
    ReadinessFailure { reason: String },

    /// The process terminated without being asked to.
    #[error("Daemon exited unexpectedly ({status}){}", format_tail(.stderr_tail))]
    UnexpectedExit {
        /// Exit code or terminating signal, e.g. `exit code 3`.
        status: String,
        /// Trailing stderr lines captured before the exit.
        stderr_tail: Option<String>,
    },
}

fn format_timeout(timeout: &Duration) -> String {
    if timeout.subsec_millis() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}

fn format_tail(tail: &Option<String>) -> String {
    match tail {
        Some(tail) if !tail.trim().is_empty() => format!(": {}", tail.trim()),
        _ => String::new(),
    }
}

/// Rejected supervisor requests.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A retarget was requested with an empty database name.
    #[error("Target database name must not be empty")]
    EmptyTarget,

    /// The settings handed to the supervisor are invalid.
    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),

    /// The supervisor's control task is no longer running.
    #[error("Supervisor has shut down")]
    Closed,
}
