//! Core domain types and port definitions for the quarry daemon supervisor.
//!
//! This crate holds everything the supervisor and its observers agree on
//! without touching processes or the network: the lifecycle state, the
//! commands that drive it, failure classification, and configuration.

pub mod domain;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{Command, DaemonState, DaemonStatus, StateChange, Target};
pub use ports::{
    DaemonFailure, DaemonLogSinkPort, OutputStream, ReadinessOutcome, SupervisorError,
};
pub use settings::{
    DEFAULT_DAEMON_PORT, DEFAULT_EXECUTABLE, DEFAULT_TARGET, ReadinessSettings, SettingsError,
    SupervisorSettings, validate_settings,
};
