//! Supervisor settings and validation.
//!
//! These are pure configuration values handed to the supervisor at
//! construction. Adapters decide where they come from (flags, environment,
//! files); this module only knows their shape, defaults, and limits.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::Target;

/// Default daemon executable, resolved on `PATH` by adapters.
pub const DEFAULT_EXECUTABLE: &str = "quarry";

/// Default port the daemon listens on.
pub const DEFAULT_DAEMON_PORT: u16 = 8420;

/// Default database bound on the first start.
pub const DEFAULT_TARGET: &str = "default";

/// Placeholder replaced by the bound database in launch arguments.
pub const DATABASE_PLACEHOLDER: &str = "{database}";

/// Placeholder replaced by the configured port in launch arguments.
pub const PORT_PLACEHOLDER: &str = "{port}";

/// How the supervisor decides that a launched daemon is servable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReadinessSettings {
    /// Poll `http://127.0.0.1:{port}{path}` until it answers 2xx.
    Http { path: String, poll_interval_ms: u64 },
    /// Watch the daemon's output for a line matching `ready_pattern`.
    /// A line matching `failure_pattern` fails the launch.
    Sentinel {
        ready_pattern: String,
        failure_pattern: Option<String>,
    },
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self::Http {
            path: "/health".to_string(),
            poll_interval_ms: 250,
        }
    }
}

impl ReadinessSettings {
    /// Sentinel readiness with no failure pattern.
    pub fn sentinel(ready_pattern: impl Into<String>) -> Self {
        Self::Sentinel {
            ready_pattern: ready_pattern.into(),
            failure_pattern: None,
        }
    }
}

/// Everything the supervisor needs to launch and police the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Daemon executable.
    pub executable: PathBuf,
    /// Argument template; see [`DATABASE_PLACEHOLDER`] and [`PORT_PLACEHOLDER`].
    pub args: Vec<String>,
    /// Extra environment for the daemon.
    pub env: BTreeMap<String, String>,
    /// Port substituted into the arguments and used by HTTP readiness.
    pub port: u16,
    /// Database bound on the first start.
    pub initial_target: String,
    /// Readiness detection strategy.
    pub readiness: ReadinessSettings,
    /// Upper bound on readiness detection.
    pub readiness_timeout_ms: u64,
    /// Time between the graceful signal and the forced kill.
    pub stop_grace_period_ms: u64,
    /// Trailing stderr lines kept for exit diagnostics.
    pub stderr_tail_lines: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            args: vec![
                "serve".to_string(),
                "--db".to_string(),
                DATABASE_PLACEHOLDER.to_string(),
                "--port".to_string(),
                PORT_PLACEHOLDER.to_string(),
            ],
            env: BTreeMap::new(),
            port: DEFAULT_DAEMON_PORT,
            initial_target: DEFAULT_TARGET.to_string(),
            readiness: ReadinessSettings::default(),
            readiness_timeout_ms: 30_000,
            stop_grace_period_ms: 5_000,
            stderr_tail_lines: 20,
        }
    }
}

impl SupervisorSettings {
    /// Default settings for a specific executable.
    pub fn for_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
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

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_initial_target(mut self, target: impl Into<String>) -> Self {
        self.initial_target = target.into();
        self
    }

    #[must_use]
    pub fn with_readiness(mut self, readiness: ReadinessSettings) -> Self {
        self.readiness = readiness;
        self
    }

    #[must_use]
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout_ms = duration_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_stop_grace_period(mut self, grace: Duration) -> Self {
        self.stop_grace_period_ms = duration_ms(grace);
        self
    }

    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    #[must_use]
    pub const fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period_ms)
    }

    /// The validated initial target.
    pub fn initial_target(&self) -> Result<Target, SettingsError> {
        Target::new(self.initial_target.as_str()).map_err(|_| SettingsError::EmptyTarget)
    }

    /// Launch arguments with the placeholders filled in for `target`.
    ///
    /// The database name is inserted last so it is never itself rewritten.
    #[must_use]
    pub fn render_args(&self, target: &Target) -> Vec<String> {
        let port = self.port.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(PORT_PLACEHOLDER, &port)
                    .replace(DATABASE_PLACEHOLDER, target.as_str())
            })
            .collect()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Daemon executable path cannot be empty")]
    EmptyExecutable,

    #[error("Initial database name cannot be empty")]
    EmptyTarget,

    #[error("Port should be >= 1024 (privileged ports require root), got {0}")]
    InvalidPort(u16),

    #[error("Readiness timeout must be greater than zero")]
    ZeroReadinessTimeout,

    #[error("Readiness poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("Invalid readiness pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Stderr tail must keep at least one line")]
    ZeroStderrTail,
}

/// Validate settings values.
pub fn validate_settings(settings: &SupervisorSettings) -> Result<(), SettingsError> {
    if settings.executable.as_os_str().is_empty() {
        return Err(SettingsError::EmptyExecutable);
    }

    settings.initial_target()?;

    if settings.port < 1024 {
        return Err(SettingsError::InvalidPort(settings.port));
    }

    if settings.readiness_timeout_ms == 0 {
        return Err(SettingsError::ZeroReadinessTimeout);
    }

    match &settings.readiness {
        ReadinessSettings::Http {
            poll_interval_ms, ..
        } => {
            if *poll_interval_ms == 0 {
                return Err(SettingsError::ZeroPollInterval);
            }
        }
        ReadinessSettings::Sentinel {
            ready_pattern,
            failure_pattern,
        } => {
            check_pattern(ready_pattern)?;
            if let Some(pattern) = failure_pattern {
                check_pattern(pattern)?;
            }
        }
    }

    if settings.stderr_tail_lines == 0 {
        return Err(SettingsError::ZeroStderrTail);
    }

    Ok(())
}

fn check_pattern(pattern: &str) -> Result<(), SettingsError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| SettingsError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}
