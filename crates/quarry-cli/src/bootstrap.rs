//! CLI bootstrap - the composition root.
//!
//! This is the only place the panel's collaborators are wired together:
//! settings from flags and environment, the supervisor, and the database
//! selector that retargets it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use quarry_core::{ReadinessSettings, SupervisorSettings, validate_settings};
use quarry_runtime::{DaemonSupervisor, TargetFollower};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::CliError;
use crate::parser::Cli;

/// Poll interval for HTTP readiness.
const HEALTH_POLL_INTERVAL_MS: u64 = 250;

/// Everything the panel loop needs.
pub struct PanelContext {
    pub supervisor: DaemonSupervisor,
    /// Database selection; every new value retargets the daemon.
    pub selector: watch::Sender<String>,
    pub follower: JoinHandle<()>,
}

/// Build validated supervisor settings from the command line.
pub fn settings_from_cli(cli: &Cli) -> Result<SupervisorSettings, CliError> {
    let mut settings = SupervisorSettings::for_executable(resolve_executable(&cli.executable))
        .with_port(cli.port)
        .with_initial_target(cli.database.clone())
        .with_readiness_timeout(Duration::from_millis(cli.readiness_timeout_ms))
        .with_stop_grace_period(Duration::from_millis(cli.stop_grace_ms));

    if !cli.daemon_args.is_empty() {
        settings = settings.with_args(cli.daemon_args.iter().cloned());
    }

    let readiness = match &cli.ready_pattern {
        Some(ready_pattern) => ReadinessSettings::Sentinel {
            ready_pattern: ready_pattern.clone(),
            failure_pattern: cli.failure_pattern.clone(),
        },
        None => ReadinessSettings::Http {
            path: cli.health_path.clone(),
            poll_interval_ms: HEALTH_POLL_INTERVAL_MS,
        },
    };
    settings = settings.with_readiness(readiness);

    validate_settings(&settings)?;
    Ok(settings)
}

/// Resolve a bare executable name on `PATH`.
///
/// Paths are used as given. A name that cannot be found is kept as is, so
/// the failure surfaces as the daemon's launch error.
pub fn resolve_executable(executable: &Path) -> PathBuf {
    let is_bare_name = executable.components().count() == 1 && !executable.is_absolute();
    if !is_bare_name {
        return executable.to_path_buf();
    }

    match which::which(executable) {
        Ok(path) => {
            debug!(path = %path.display(), "Resolved daemon executable");
            path
        }
        Err(e) => {
            warn!(executable = %executable.display(), error = %e, "Daemon executable not found on PATH");
            executable.to_path_buf()
        }
    }
}

/// Wire the supervisor and the database selector.
///
/// Must be called from within a tokio runtime.
pub fn bootstrap(cli: &Cli) -> Result<PanelContext, CliError> {
    let settings = settings_from_cli(cli)?;
    let initial = settings.initial_target.clone();
    let supervisor = DaemonSupervisor::new(settings)?;

    let (selector, selection) = watch::channel(initial);
    let follower = TargetFollower::spawn(supervisor.clone(), selection);

    Ok(PanelContext {
        supervisor,
        selector,
        follower,
    })
}
