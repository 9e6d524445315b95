//! The control task: single owner of the daemon's state and process.
//!
//! Commands, process exit, and readiness outcomes are all events on one
//! `select!` loop, so transitions are applied strictly one at a time. A
//! command handler runs to completion (including any termination it
//! performs) before the next event is looked at.

use std::future::pending;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use quarry_core::{
    Command, DaemonFailure, DaemonLogSinkPort, DaemonState, ReadinessOutcome, SupervisorSettings,
    Target,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::publisher::StatePublisher;
use crate::process::{LaunchSpec, ProcessHandle, describe_exit};
use crate::readiness::{ProbeContext, ReadinessProbe, await_ready_within};

/// Closing its output can race ahead of the process becoming reapable.
const EXIT_SETTLE: Duration = Duration::from_millis(100);

/// Messages accepted by the control task.
#[derive(Debug)]
pub(crate) enum ControlMsg {
    Command(Command),
    /// Stop the daemon, acknowledge, and exit.
    Shutdown(oneshot::Sender<()>),
}

/// The live daemon; exists only in `Starting` and `Running`.
struct SupervisedProcess {
    handle: ProcessHandle,
    target: Target,
    launched_at: Instant,
}

/// An in-flight readiness probe for the current process.
struct PendingReadiness {
    task: JoinHandle<ReadinessOutcome>,
    cancel: CancellationToken,
}

impl PendingReadiness {
    fn abandon(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

enum Event {
    Message(Option<ControlMsg>),
    Exited(io::Result<ExitStatus>),
    Readiness(Result<ReadinessOutcome, JoinError>),
}

pub(crate) struct ControlTask {
    settings: SupervisorSettings,
    probe: Arc<dyn ReadinessProbe>,
    sink: Option<Arc<dyn DaemonLogSinkPort>>,
    publisher: StatePublisher,
    commands: mpsc::UnboundedReceiver<ControlMsg>,
    /// Target for the next launch; equals the bound target while active.
    target: Target,
    process: Option<SupervisedProcess>,
    readiness: Option<PendingReadiness>,
}

impl ControlTask {
    pub(crate) fn new(
        settings: SupervisorSettings,
        target: Target,
        probe: Arc<dyn ReadinessProbe>,
        sink: Option<Arc<dyn DaemonLogSinkPort>>,
        publisher: StatePublisher,
        commands: mpsc::UnboundedReceiver<ControlMsg>,
    ) -> Self {
        Self {
            settings,
            probe,
            sink,
            publisher,
            commands,
            target,
            process: None,
            readiness: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(target_db = %self.target, "Supervisor control task started");

        loop {
            // Commands first: a Stop must win over a readiness result that
            // completed at the same time.
            let event = tokio::select! {
                biased;
                msg = self.commands.recv() => Event::Message(msg),
                status = wait_exit(&mut self.process) => Event::Exited(status),
                outcome = wait_readiness(&mut self.readiness) => Event::Readiness(outcome),
            };

            match event {
                Event::Message(Some(ControlMsg::Command(command))) => {
                    self.handle_command(command).await;
                }
                Event::Message(Some(ControlMsg::Shutdown(done))) => {
                    self.stop_daemon().await;
                    let _ = done.send(());
                    break;
                }
                Event::Message(None) => {
                    debug!("All supervisor handles dropped");
                    self.stop_daemon().await;
                    break;
                }
                Event::Exited(status) => self.on_exit(status).await,
                Event::Readiness(outcome) => self.on_readiness(outcome).await,
            }
        }

        debug!("Supervisor control task exiting");
    }

    async fn handle_command(&mut self, command: Command) {
        let state = self.publisher.current();
        debug!(%command, %state, "Applying command");

        match command {
            Command::Start => {
                if state.is_active() {
                    debug!(%state, "Start ignored, daemon already active");
                } else {
                    self.launch();
                }
            }
            Command::Stop => self.stop_daemon().await,
            Command::Restart => {
                if state.is_active() {
                    self.relaunch().await;
                } else {
                    self.launch();
                }
            }
            Command::Retarget(target) => {
                if target == self.target {
                    debug!(target_db = %target, "Retarget ignored, already bound");
                    return;
                }
                info!(from = %self.target, to = %target, "Retargeting daemon");
                self.target = target;
                if state.is_active() {
                    self.relaunch().await;
                }
            }
        }
    }

    /// Replace the active process without ever publishing `Stopped`.
    async fn relaunch(&mut self) {
        self.publisher.transition(DaemonState::Starting);
        self.teardown().await;
        self.spawn_process();
    }

    fn launch(&mut self) {
        self.publisher.transition(DaemonState::Starting);
        self.spawn_process();
    }

    fn spawn_process(&mut self) {
        let spec = LaunchSpec::for_target(&self.settings, &self.target);
        let mut handle =
            match ProcessHandle::launch(&spec, self.settings.stderr_tail_lines, self.sink.clone()) {
                Ok(handle) => handle,
                Err(failure) => {
                    self.fail(&failure);
                    return;
                }
            };

        let ctx = ProbeContext {
            pid: handle.pid(),
            port: self.settings.port,
            output: handle.subscribe_output(),
        };
        let cancel = CancellationToken::new();
        let probe = Arc::clone(&self.probe);
        let deadline = self.settings.readiness_timeout();
        let token = cancel.clone();
        let task =
            tokio::spawn(async move { await_ready_within(probe.as_ref(), ctx, token, deadline).await });

        info!(pid = handle.pid(), target_db = %self.target, "Awaiting daemon readiness");
        self.readiness = Some(PendingReadiness { task, cancel });
        self.process = Some(SupervisedProcess {
            handle,
            target: self.target.clone(),
            launched_at: Instant::now(),
        });
    }

    /// Cancel any probe, then terminate and reap the process.
    async fn teardown(&mut self) {
        if let Some(readiness) = self.readiness.take() {
            readiness.abandon();
        }

        let Some(mut process) = self.process.take() else {
            return;
        };
        let pid = process.handle.pid();
        match process
            .handle
            .terminate(self.settings.stop_grace_period())
            .await
        {
            Ok(status) => info!(
                pid,
                target_db = %process.target,
                status = %describe_exit(status),
                uptime_ms = process.launched_at.elapsed().as_millis(),
                "Daemon stopped"
            ),
            Err(e) => warn!(pid, error = %e, "Failed to reap daemon process"),
        }
    }

    async fn stop_daemon(&mut self) {
        self.teardown().await;
        self.publisher.transition(DaemonState::Stopped);
    }

    async fn on_readiness(&mut self, result: Result<ReadinessOutcome, JoinError>) {
        self.readiness = None;
        let outcome = result
            .unwrap_or_else(|e| ReadinessOutcome::Failed(format!("readiness probe aborted: {e}")));

        match outcome {
            ReadinessOutcome::Ready => {
                if let Some(process) = &self.process {
                    info!(
                        pid = process.handle.pid(),
                        target_db = %process.target,
                        elapsed_ms = process.launched_at.elapsed().as_millis(),
                        "Daemon is ready"
                    );
                    self.publisher
                        .transition(DaemonState::running(process.target.clone()));
                }
            }
            ReadinessOutcome::Failed(reason) => {
                self.abort_launch(DaemonFailure::ReadinessFailure { reason })
                    .await;
            }
            ReadinessOutcome::TimedOut => {
                let timeout = self.settings.readiness_timeout();
                self.abort_launch(DaemonFailure::ReadinessTimeout { timeout })
                    .await;
            }
            ReadinessOutcome::Cancelled => {
                debug!("Readiness probe cancelled");
            }
        }
    }

    /// Give up on the current launch with `failure`.
    ///
    /// A process that died (or is dying) is reported by its exit instead,
    /// which carries the better diagnostic.
    async fn abort_launch(&mut self, failure: DaemonFailure) {
        let failure = if let Some(process) = self.process.as_mut() {
            let exited = timeout(EXIT_SETTLE, process.handle.wait()).await;
            match exited {
                Ok(Ok(status)) => process.handle.unexpected_exit(status).await,
                _ => failure,
            }
        } else {
            failure
        };
        self.teardown().await;
        self.fail(&failure);
    }

    async fn on_exit(&mut self, status: io::Result<ExitStatus>) {
        if let Some(readiness) = self.readiness.take() {
            readiness.abandon();
        }
        let Some(mut process) = self.process.take() else {
            return;
        };

        let failure = match status {
            Ok(status) => process.handle.unexpected_exit(status).await,
            Err(e) => DaemonFailure::UnexpectedExit {
                status: format!("unknown, wait failed: {e}"),
                stderr_tail: process.handle.stderr_tail(),
            },
        };
        warn!(
            pid = process.handle.pid(),
            target_db = %process.target,
            uptime_ms = process.launched_at.elapsed().as_millis(),
            "Daemon exited unexpectedly"
        );
        drop(process);
        self.fail(&failure);
    }

    fn fail(&self, failure: &DaemonFailure) {
        warn!(error = %failure, "Daemon failure");
        self.publisher.transition(DaemonState::error(failure));
    }
}

async fn wait_exit(process: &mut Option<SupervisedProcess>) -> io::Result<ExitStatus> {
    match process {
        Some(process) => process.handle.wait().await,
        None => pending().await,
    }
}

async fn wait_readiness(
    readiness: &mut Option<PendingReadiness>,
) -> Result<ReadinessOutcome, JoinError> {
    match readiness {
        Some(readiness) => (&mut readiness.task).await,
        None => pending().await,
    }
}
