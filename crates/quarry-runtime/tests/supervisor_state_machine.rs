//! Integration tests for the `DaemonSupervisor` state machine.
//!
//! Each test drives a real `/bin/sh` fake daemon through the supervisor
//! and observes the published states.
//!
//! # What is tested
//!
//! - Launch failure surfaces as `Error`, and `stop` still resets to `Stopped`
//! - `start` is idempotent while starting or running
//! - `restart` never publishes `Stopped`
//! - `retarget` relaunches with the new database, or does nothing if unchanged
//! - `retarget` while stopped or failed only takes effect on the next start
//! - An external kill is detected without any command
//! - Cancelling a launch, readiness timeouts, and early exits
//! - Nothing survives `stop`, `shutdown`, or dropping the last handle
#![cfg(unix)]

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{
    FakeDaemon, READY_SCRIPT, SILENT_SCRIPT, WAIT, collect_until, process_exists, settle,
    settle_running, wait_gone,
};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use quarry_core::{
    DaemonLogSinkPort, DaemonState, OutputStream, ReadinessSettings, SupervisorSettings,
};
use quarry_runtime::DaemonSupervisor;
use tokio::time::timeout;

// ── Launch failures ────────────────────────────────────────────────

#[tokio::test]
async fn test_nonexistent_executable_ends_in_error_then_stops() {
    let settings = SupervisorSettings::for_executable("/nonexistent/quarry-daemon")
        .with_readiness(ReadinessSettings::sentinel("^ready "));
    let supervisor = DaemonSupervisor::new(settings).unwrap();
    let mut changes = supervisor.subscribe();

    supervisor.start().unwrap();
    let seen = collect_until(&mut changes, |s| s.error_message().is_some()).await;
    assert_eq!(seen[0], DaemonState::Starting);

    let message = seen.last().unwrap().error_message().unwrap().to_string();
    assert!(
        message.starts_with("Failed to launch /nonexistent/quarry-daemon"),
        "message: {message}"
    );

    supervisor.stop().unwrap();
    settle(&supervisor, |s| *s == DaemonState::Stopped).await;
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_early_exit_reports_exit_code_and_stderr() {
    let daemon = FakeDaemon::new();
    let settings = daemon.settings(r#"echo "index is locked" >&2; exit 3"#);
    let supervisor = DaemonSupervisor::new(settings).unwrap();

    supervisor.start().unwrap();
    let state = settle(&supervisor, |s| s.error_message().is_some()).await;
    let message = state.error_message().unwrap();
    assert!(message.contains("exit code 3"), "message: {message}");
    assert!(message.contains("index is locked"), "message: {message}");
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_readiness_timeout_is_error_and_kills_process() {
    let daemon = FakeDaemon::new();
    let settings = daemon
        .settings(SILENT_SCRIPT)
        .with_readiness_timeout(Duration::from_millis(300));
    let supervisor = DaemonSupervisor::new(settings).unwrap();

    supervisor.start().unwrap();
    let state = settle(&supervisor, |s| s.error_message().is_some()).await;
    assert_eq!(
        state.error_message(),
        Some("Daemon did not become ready within 300ms")
    );
    wait_gone(daemon.last_pid()).await;
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failure_sentinel_fails_launch() {
    let daemon = FakeDaemon::new();
    let settings = daemon
        .settings(r#"echo "FATAL: no such database $1"; exec sleep 30"#)
        .with_readiness(ReadinessSettings::Sentinel {
            ready_pattern: "^ready ".to_string(),
            failure_pattern: Some("^FATAL".to_string()),
        });
    let supervisor = DaemonSupervisor::new(settings).unwrap();

    supervisor.start().unwrap();
    let state = settle(&supervisor, |s| s.error_message().is_some()).await;
    assert_eq!(
        state.error_message(),
        Some("Daemon failed to start: FATAL: no such database A")
    );
    supervisor.shutdown().await.unwrap();
}

// ── Idempotence and atomic restart ─────────────────────────────────

#[tokio::test]
async fn test_double_start_launches_once() {
    let daemon = FakeDaemon::new();
    let supervisor = DaemonSupervisor::new(daemon.settings(READY_SCRIPT)).unwrap();

    supervisor.start().unwrap();
    supervisor.start().unwrap();
    settle_running(&supervisor, "A").await;
    supervisor.start().unwrap();

    // Commands are applied in order, so this stop follows all three starts
    supervisor.stop().unwrap();
    settle(&supervisor, |s| *s == DaemonState::Stopped).await;
    assert_eq!(daemon.launches().len(), 1);
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_never_publishes_stopped() {
    let daemon = FakeDaemon::new();
    let supervisor = DaemonSupervisor::new(daemon.settings(READY_SCRIPT)).unwrap();
    supervisor.start().unwrap();
    settle_running(&supervisor, "A").await;
    let first_pid = daemon.last_pid();

    let mut changes = supervisor.subscribe();
    supervisor.restart().unwrap();
    let seen = collect_until(&mut changes, |s| !matches!(s, DaemonState::Starting)).await;

    assert_eq!(seen.len(), 2, "seen: {seen:?}");
    assert_eq!(seen[0], DaemonState::Starting);
    assert_eq!(seen[1].target().map(|t| t.as_str()), Some("A"));
    assert!(!seen.contains(&DaemonState::Stopped));

    let launches = daemon.launches();
    assert_eq!(launches.len(), 2);
    assert_ne!(launches[1].0, first_pid);
    assert!(!process_exists(first_pid));
    supervisor.shutdown().await.unwrap();
}

// ── Retarget ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_retarget_relaunches_with_new_database() {
    let daemon = FakeDaemon::new();
    let supervisor = DaemonSupervisor::new(daemon.settings(READY_SCRIPT)).unwrap();
    supervisor.start().unwrap();
    settle_running(&supervisor, "A").await;

    let mut changes = supervisor.subscribe();
    supervisor.retarget("B").unwrap();
    let seen = collect_until(&mut changes, |s| !matches!(s, DaemonState::Starting)).await;

    assert_eq!(seen[0], DaemonState::Starting);
    assert_eq!(seen[1].target().map(|t| t.as_str()), Some("B"));

    let databases: Vec<String> = daemon.launches().into_iter().map(|(_, db)| db).collect();
    assert_eq!(databases, ["A", "B"]);
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_retarget_to_bound_database_is_noop() {
    let daemon = FakeDaemon::new();
    let supervisor = DaemonSupervisor::new(daemon.settings(READY_SCRIPT)).unwrap();
    supervisor.start().unwrap();
    settle_running(&supervisor, "A").await;

    let mut changes = supervisor.subscribe();
    supervisor.retarget(" A ").unwrap();
    supervisor.stop().unwrap();

    // The first change after the retarget must come from the stop
    let change = timeout(WAIT, changes.recv()).await.unwrap().unwrap();
    assert_eq!(change.to, DaemonState::Stopped);
    assert_eq!(daemon.launches().len(), 1);
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_retarget_while_stopped_applies_on_next_start() {
    let daemon = FakeDaemon::new();
    let supervisor = DaemonSupervisor::new(daemon.settings(READY_SCRIPT)).unwrap();
    let mut changes = supervisor.subscribe();

    supervisor.retarget("B").unwrap();
    supervisor.start().unwrap();

    let first = timeout(WAIT, changes.recv()).await.unwrap().unwrap();
    assert_eq!(first.to, DaemonState::Starting);
    settle_running(&supervisor, "B").await;
    assert_eq!(daemon.launches().len(), 1);
    supervisor.shutdown().await.unwrap();
}

/// Becomes ready only when launched for database `B`.
const READY_ONLY_FOR_B_SCRIPT: &str =
    r#"echo "$$ $1" >> "$LAUNCH_LOG"; if [ "$1" = B ]; then echo "ready $1"; fi; exec sleep 30"#;

async fn wait_for_launches(daemon: &FakeDaemon, count: usize) {
    timeout(WAIT, async {
        while daemon.launches().len() < count {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("launch not recorded in time");
}

#[tokio::test]
async fn test_retarget_while_error_applies_on_next_start() {
    let daemon = FakeDaemon::new();
    let settings = daemon
        .settings(READY_ONLY_FOR_B_SCRIPT)
        .with_readiness_timeout(Duration::from_millis(300));
    let supervisor = DaemonSupervisor::new(settings).unwrap();
    supervisor.start().unwrap();
    let failed = settle(&supervisor, |s| s.error_message().is_some()).await;

    supervisor.retarget("B").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(supervisor.state(), failed);
    assert_eq!(daemon.launches().len(), 1);

    supervisor.start().unwrap();
    settle_running(&supervisor, "B").await;
    let databases: Vec<String> = daemon.launches().into_iter().map(|(_, db)| db).collect();
    assert_eq!(databases, ["A", "B"]);
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_retarget_during_starting_relaunches() {
    let daemon = FakeDaemon::new();
    let supervisor = DaemonSupervisor::new(daemon.settings(READY_ONLY_FOR_B_SCRIPT)).unwrap();
    let mut changes = supervisor.subscribe();

    supervisor.start().unwrap();
    settle(&supervisor, |s| *s == DaemonState::Starting).await;
    wait_for_launches(&daemon, 1).await;
    let first_pid = daemon.last_pid();

    supervisor.retarget("B").unwrap();
    let seen = collect_until(&mut changes, |s| s.target().is_some()).await;

    assert_eq!(seen.len(), 2, "published: {seen:?}");
    assert_eq!(seen[0], DaemonState::Starting);
    assert_eq!(seen[1].target().map(|t| t.as_str()), Some("B"));
    assert!(!process_exists(first_pid));
    let databases: Vec<String> = daemon.launches().into_iter().map(|(_, db)| db).collect();
    assert_eq!(databases, ["A", "B"]);
    supervisor.shutdown().await.unwrap();
}

// ── Exit monitoring ────────────────────────────────────────────────

#[tokio::test]
async fn test_external_kill_becomes_error() {
    let daemon = FakeDaemon::new();
    let supervisor = DaemonSupervisor::new(daemon.settings(READY_SCRIPT)).unwrap();
    supervisor.start().unwrap();
    settle_running(&supervisor, "A").await;

    kill(Pid::from_raw(daemon.last_pid()), Signal::SIGKILL).unwrap();

    let state = settle(&supervisor, |s| s.error_message().is_some()).await;
    let message = state.error_message().unwrap();
    assert!(message.contains("SIGKILL"), "message: {message}");

    // Not sticky
    supervisor.start().unwrap();
    settle_running(&supervisor, "A").await;
    supervisor.shutdown().await.unwrap();
}

// ── Stopping and cleanup ───────────────────────────────────────────

#[tokio::test]
async fn test_stop_reaps_process() {
    let daemon = FakeDaemon::new();
    let supervisor = DaemonSupervisor::new(daemon.settings(READY_SCRIPT)).unwrap();
    supervisor.start().unwrap();
    settle_running(&supervisor, "A").await;
    let pid = daemon.last_pid();

    supervisor.stop().unwrap();
    settle(&supervisor, |s| *s == DaemonState::Stopped).await;
    assert!(!process_exists(pid));

    // Idempotent
    supervisor.stop().unwrap();
    assert_eq!(supervisor.state(), DaemonState::Stopped);
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_during_starting_cancels_launch() {
    let daemon = FakeDaemon::new();
    let supervisor = DaemonSupervisor::new(daemon.settings(SILENT_SCRIPT)).unwrap();
    let mut changes = supervisor.subscribe();

    supervisor.start().unwrap();
    settle(&supervisor, |s| *s == DaemonState::Starting).await;
    timeout(WAIT, async {
        while daemon.launches().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    let pid = daemon.last_pid();

    supervisor.stop().unwrap();
    let seen = collect_until(&mut changes, |s| *s == DaemonState::Stopped).await;
    assert_eq!(seen, [DaemonState::Starting, DaemonState::Stopped]);
    assert!(!process_exists(pid));
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_escalates_for_stubborn_daemon() {
    let daemon = FakeDaemon::new();
    let script = r#"trap '' TERM; echo "$$ $1" >> "$LAUNCH_LOG"; echo "ready $1"; while :; do sleep 1; done"#;
    let settings = daemon
        .settings(script)
        .with_stop_grace_period(Duration::from_millis(200));
    let supervisor = DaemonSupervisor::new(settings).unwrap();
    supervisor.start().unwrap();
    settle_running(&supervisor, "A").await;
    let pid = daemon.last_pid();

    supervisor.stop().unwrap();
    settle(&supervisor, |s| *s == DaemonState::Stopped).await;
    assert!(!process_exists(pid));
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dropping_last_handle_stops_daemon() {
    let daemon = FakeDaemon::new();
    let supervisor = DaemonSupervisor::new(daemon.settings(READY_SCRIPT)).unwrap();
    supervisor.start().unwrap();
    settle_running(&supervisor, "A").await;
    let pid = daemon.last_pid();

    drop(supervisor);
    wait_gone(pid).await;
}

#[tokio::test]
async fn test_shutdown_reaps_daemon_before_returning() {
    let daemon = FakeDaemon::new();
    let supervisor = DaemonSupervisor::new(daemon.settings(READY_SCRIPT)).unwrap();
    supervisor.start().unwrap();
    settle_running(&supervisor, "A").await;
    let pid = daemon.last_pid();

    supervisor.shutdown().await.unwrap();
    assert!(!process_exists(pid));
    assert_eq!(supervisor.state(), DaemonState::Stopped);
    assert!(supervisor.start().is_err());
}

// ── Output forwarding ──────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<(OutputStream, String)>>,
}

impl DaemonLogSinkPort for RecordingSink {
    fn append(&self, _pid: u32, stream: OutputStream, line: String) {
        self.lines.lock().unwrap().push((stream, line));
    }
}

#[tokio::test]
async fn test_log_sink_receives_daemon_output() {
    let daemon = FakeDaemon::new();
    let sink = Arc::new(RecordingSink::default());
    let supervisor = DaemonSupervisor::builder(daemon.settings(READY_SCRIPT))
        .log_sink(sink.clone())
        .build()
        .unwrap();

    supervisor.start().unwrap();
    settle_running(&supervisor, "A").await;

    let lines = sink.lines.lock().unwrap().clone();
    assert!(lines.contains(&(OutputStream::Stdout, "ready A".to_string())));
    supervisor.shutdown().await.unwrap();
}
