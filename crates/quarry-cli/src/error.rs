//! CLI-specific error types and exit codes.

use quarry_core::{SettingsError, SupervisorError};
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// A panel command or flag was not understood.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error on the terminal.
    #[error("IO error: {0}")]
    Io(String),

    /// The daemon settings are unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The supervisor could not be reached.
    #[error("Process error: {0}")]
    Process(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Io(_) => 74,       // EX_IOERR
            Self::Config(_) => 78,   // EX_CONFIG
            Self::Process(_) => 71,  // EX_OSERR
        }
    }
}

impl From<SupervisorError> for CliError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::EmptyTarget => Self::Arguments(err.to_string()),
            SupervisorError::InvalidSettings(settings) => Self::from(settings),
            SupervisorError::Closed => Self::Process(err.to_string()),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
