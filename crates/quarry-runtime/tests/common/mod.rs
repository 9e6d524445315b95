//! Shared fixtures for supervisor integration tests.
//!
//! Fake daemons are `/bin/sh` scripts. Each launch appends `<pid> <database>`
//! to a launch log so tests can count launches and see which database a
//! process was started for.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use quarry_core::{DaemonState, ReadinessSettings, StateChange, SupervisorSettings};
use quarry_runtime::DaemonSupervisor;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

/// Upper bound for any single expected event.
pub const WAIT: Duration = Duration::from_secs(10);

/// Records the launch, announces readiness, then idles.
pub const READY_SCRIPT: &str = r#"echo "$$ $1" >> "$LAUNCH_LOG"; echo "ready $1"; exec sleep 30"#;

/// Records the launch and idles without ever becoming ready.
pub const SILENT_SCRIPT: &str = r#"echo "$$ $1" >> "$LAUNCH_LOG"; exec sleep 30"#;

/// A fake daemon plus the temp dir holding its launch log.
pub struct FakeDaemon {
    dir: TempDir,
}

/// Route supervisor logs to the test harness; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl FakeDaemon {
    pub fn new() -> Self {
        init_tracing();
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn launch_log(&self) -> PathBuf {
        self.dir.path().join("launches.log")
    }

    /// Settings running `script` with `$1` bound to the database.
    pub fn settings(&self, script: &str) -> SupervisorSettings {
        SupervisorSettings::for_executable("/bin/sh")
            .with_args(["-c", script, "fake-quarry", "{database}"])
            .with_env("LAUNCH_LOG", self.launch_log().display().to_string())
            .with_initial_target("A")
            .with_readiness(ReadinessSettings::sentinel("^ready "))
            .with_readiness_timeout(Duration::from_secs(10))
            .with_stop_grace_period(Duration::from_secs(2))
    }

    /// `(pid, database)` for every launch so far.
    pub fn launches(&self) -> Vec<(i32, String)> {
        read_launches(&self.launch_log())
    }

    pub fn last_pid(&self) -> i32 {
        self.launches().last().expect("no launch recorded").0
    }
}

fn read_launches(path: &Path) -> Vec<(i32, String)> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    contents
        .lines()
        .filter_map(|line| {
            let (pid, database) = line.split_once(' ')?;
            Some((pid.parse().ok()?, database.to_string()))
        })
        .collect()
}

/// Wait for a state matching `predicate`.
pub async fn settle(
    supervisor: &DaemonSupervisor,
    predicate: impl FnMut(&DaemonState) -> bool,
) -> DaemonState {
    timeout(WAIT, supervisor.wait_until(predicate))
        .await
        .expect("state not reached in time")
        .expect("supervisor closed")
}

pub async fn settle_running(supervisor: &DaemonSupervisor, database: &str) -> DaemonState {
    settle(supervisor, |s| {
        s.target().is_some_and(|t| t.as_str() == database)
    })
    .await
}

/// Collect published states until one matches `done` (inclusive).
pub async fn collect_until(
    changes: &mut broadcast::Receiver<StateChange>,
    mut done: impl FnMut(&DaemonState) -> bool,
) -> Vec<DaemonState> {
    let mut seen = Vec::new();
    loop {
        let change = timeout(WAIT, changes.recv())
            .await
            .expect("no state change in time")
            .expect("state channel closed");
        let finished = done(&change.to);
        seen.push(change.to);
        if finished {
            return seen;
        }
    }
}

/// Whether a process with `pid` still exists (zombies included).
#[cfg(unix)]
pub fn process_exists(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid), None).is_ok()
}

/// Poll until `pid` is gone.
#[cfg(unix)]
pub async fn wait_gone(pid: i32) {
    timeout(WAIT, async {
        while process_exists(pid) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("process still alive");
}
