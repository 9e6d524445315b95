//! Command-line arguments for the panel.
//!
//! Every daemon setting can also come from a `QUARRY_*` environment
//! variable, which a `.env` file may provide.

use std::path::PathBuf;

use clap::Parser;
use quarry_core::{DEFAULT_DAEMON_PORT, DEFAULT_EXECUTABLE, DEFAULT_TARGET};

/// Supervise the quarry search backend from the terminal.
#[derive(Debug, Parser)]
#[command(name = "quarry-panel")]
#[command(about = "Supervise the quarry search backend from the terminal")]
#[command(version)]
pub struct Cli {
    /// Daemon executable; bare names are looked up on PATH
    #[arg(long, env = "QUARRY_EXECUTABLE", default_value = DEFAULT_EXECUTABLE)]
    pub executable: PathBuf,

    /// Database the daemon serves when the panel opens
    #[arg(short = 'd', long, env = "QUARRY_DATABASE", default_value = DEFAULT_TARGET)]
    pub database: String,

    /// Port the daemon listens on
    #[arg(short = 'p', long, env = "QUARRY_PORT", default_value_t = DEFAULT_DAEMON_PORT)]
    pub port: u16,

    /// Replace the daemon argument template (repeatable; `{database}` and `{port}` are substituted)
    #[arg(long = "daemon-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub daemon_args: Vec<String>,

    /// Treat a daemon output line matching this regex as readiness instead of polling HTTP
    #[arg(long, env = "QUARRY_READY_PATTERN")]
    pub ready_pattern: Option<String>,

    /// Fail the launch on a daemon output line matching this regex
    #[arg(long, requires = "ready_pattern")]
    pub failure_pattern: Option<String>,

    /// Health endpoint polled for readiness
    #[arg(long, default_value = "/health")]
    pub health_path: String,

    /// Give up on readiness after this many milliseconds
    #[arg(long, env = "QUARRY_READINESS_TIMEOUT_MS", default_value_t = 30_000)]
    pub readiness_timeout_ms: u64,

    /// Grace period between SIGTERM and SIGKILL when stopping
    #[arg(long = "stop-grace-ms", env = "QUARRY_STOP_GRACE_MS", default_value_t = 5_000)]
    pub stop_grace_ms: u64,

    /// Do not start the daemon when the panel opens
    #[arg(long)]
    pub no_autostart: bool,

    /// Print state changes as JSON lines instead of the panel
    #[arg(long)]
    pub json: bool,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
