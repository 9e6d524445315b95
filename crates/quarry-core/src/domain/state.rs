//! Daemon lifecycle state published to observers.
//!
//! The supervisor owns exactly one current `DaemonState`. Observers only
//! ever see committed values of it, either as a snapshot or as a
//! `StateChange` notification.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Target;

/// Lifecycle state of the supervised daemon.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DaemonState {
    /// No subprocess exists.
    #[default]
    Stopped,
    /// Subprocess launched, readiness not yet confirmed.
    Starting,
    /// Subprocess confirmed ready and bound to `target`.
    Running {
        /// Database the daemon is serving.
        target: Target,
    },
    /// The last attempt failed; carries a human-readable diagnostic.
    Error {
        /// Diagnostic text for the failure.
        message: String,
    },
}

impl DaemonState {
    /// Build a running state for `target`.
    #[must_use]
    pub const fn running(target: Target) -> Self {
        Self::Running { target }
    }

    /// Build an error state from anything displayable.
    pub fn error(message: impl fmt::Display) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }

    /// Payload-free classification of this state.
    #[must_use]
    pub const fn status(&self) -> DaemonStatus {
        match self {
            Self::Stopped => DaemonStatus::Stopped,
            Self::Starting => DaemonStatus::Starting,
            Self::Running { .. } => DaemonStatus::Running,
            Self::Error { .. } => DaemonStatus::Error,
        }
    }

    /// Database the daemon is serving, if it is running.
    #[must_use]
    pub const fn target(&self) -> Option<&Target> {
        match self {
            Self::Running { target } => Some(target),
            _ => None,
        }
    }

    /// Diagnostic text, if this is an error state.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message } => Some(message),
            _ => None,
        }
    }

    /// True when a subprocess is (or is being) kept alive.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running { .. })
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("Stopped"),
            Self::Starting => f.write_str("Starting"),
            Self::Running { target } => write!(f, "Running({target})"),
            Self::Error { message } => write!(f, "Error({message})"),
        }
    }
}

/// Data-free counterpart of [`DaemonState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    Stopped,
    Starting,
    Running,
    Error,
}

/// One committed transition, as broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    /// State before the transition.
    pub from: DaemonState,
    /// State after the transition (the new current state).
    pub to: DaemonState,
    /// When the transition was committed.
    pub at: DateTime<Utc>,
}

impl StateChange {
    /// Record a transition happening now.
    #[must_use]
    pub fn now(from: DaemonState, to: DaemonState) -> Self {
        Self {
            from,
            to,
            at: Utc::now(),
        }
    }
}
