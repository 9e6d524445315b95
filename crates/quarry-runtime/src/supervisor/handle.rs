//! Cloneable front door to the control task.

use std::sync::{Arc, Mutex, PoisonError};

use quarry_core::{
    Command, DaemonLogSinkPort, DaemonState, StateChange, SupervisorError, SupervisorSettings,
    Target, validate_settings,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::control::{ControlMsg, ControlTask};
use super::publisher::StatePublisher;
use crate::readiness::{ReadinessProbe, probe_from_settings};

/// Supervises one daemon process on behalf of any number of observers.
///
/// Commands return as soon as they are queued; their effect is observed
/// through [`state`](Self::state), [`subscribe`](Self::subscribe), or
/// [`watch`](Self::watch). Clones share the same control task. When the
/// last clone is dropped the daemon is stopped in the background; call
/// [`shutdown`](Self::shutdown) to wait for that instead.
#[derive(Clone)]
pub struct DaemonSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    commands: mpsc::UnboundedSender<ControlMsg>,
    state: watch::Receiver<DaemonState>,
    changes: broadcast::Sender<StateChange>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for [`DaemonSupervisor`] with non-default collaborators.
pub struct SupervisorBuilder {
    settings: SupervisorSettings,
    probe: Option<Arc<dyn ReadinessProbe>>,
    sink: Option<Arc<dyn DaemonLogSinkPort>>,
}

impl SupervisorBuilder {
    /// Use `probe` instead of the one described by the settings.
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Forward every daemon output line to `sink`.
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn DaemonLogSinkPort>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the settings and spawn the control task.
    ///
    /// Must be called from within a tokio runtime. The daemon is not
    /// started; the initial state is `Stopped`.
    pub fn build(self) -> Result<DaemonSupervisor, SupervisorError> {
        validate_settings(&self.settings)?;
        let target = self.settings.initial_target()?;
        let probe = match self.probe {
            Some(probe) => probe,
            None => probe_from_settings(&self.settings)?,
        };

        let publisher = StatePublisher::new();
        let state = publisher.watch();
        let changes = publisher.changes();
        let (commands, rx) = mpsc::unbounded_channel();

        debug!(
            executable = %self.settings.executable.display(),
            target_db = %target,
            "Spawning daemon supervisor"
        );
        let control = ControlTask::new(self.settings, target, probe, self.sink, publisher, rx);
        let task = tokio::spawn(control.run());

        Ok(DaemonSupervisor {
            inner: Arc::new(Inner {
                commands,
                state,
                changes,
                task: Mutex::new(Some(task)),
            }),
        })
    }
}

impl DaemonSupervisor {
    /// Supervisor using the readiness probe described by `settings`.
    pub fn new(settings: SupervisorSettings) -> Result<Self, SupervisorError> {
        Self::builder(settings).build()
    }

    pub fn builder(settings: SupervisorSettings) -> SupervisorBuilder {
        SupervisorBuilder {
            settings,
            probe: None,
            sink: None,
        }
    }

    /// Start the daemon. No effect while it is starting or running.
    pub fn start(&self) -> Result<(), SupervisorError> {
        self.send(Command::Start)
    }

    /// Stop the daemon; always ends in `Stopped`.
    pub fn stop(&self) -> Result<(), SupervisorError> {
        self.send(Command::Stop)
    }

    /// Relaunch the daemon, publishing `Starting` rather than `Stopped`.
    pub fn restart(&self) -> Result<(), SupervisorError> {
        self.send(Command::Restart)
    }

    /// Bind the daemon to another database.
    ///
    /// A running daemon is relaunched; a stopped or failed one only records
    /// the target for the next start. Retargeting to the bound database
    /// does nothing.
    pub fn retarget(&self, target: impl Into<String>) -> Result<(), SupervisorError> {
        let target = Target::new(target)?;
        self.send(Command::Retarget(target))
    }

    /// Current state.
    pub fn state(&self) -> DaemonState {
        self.inner.state.borrow().clone()
    }

    /// Receive every transition committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.inner.changes.subscribe()
    }

    /// Latest-value view of the state.
    pub fn watch(&self) -> watch::Receiver<DaemonState> {
        self.inner.state.clone()
    }

    /// Wait until the state satisfies `predicate`, returning that state.
    ///
    /// Fails with `Closed` if the supervisor shuts down first.
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&DaemonState) -> bool,
    ) -> Result<DaemonState, SupervisorError> {
        let mut state = self.watch();
        let matched = state
            .wait_for(predicate)
            .await
            .map_err(|_| SupervisorError::Closed)?;
        Ok(matched.clone())
    }

    /// Stop the daemon and end the control task.
    ///
    /// Returns once the daemon process has been reaped. Every clone is
    /// unusable afterwards; their commands fail with `Closed`.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        let (done, acknowledged) = oneshot::channel();
        self.inner
            .commands
            .send(ControlMsg::Shutdown(done))
            .map_err(|_| SupervisorError::Closed)?;
        acknowledged.await.map_err(|_| SupervisorError::Closed)?;

        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Supervisor control task ended abnormally");
            }
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<(), SupervisorError> {
        self.inner
            .commands
            .send(ControlMsg::Command(command))
            .map_err(|_| SupervisorError::Closed)
    }
}

impl std::fmt::Debug for DaemonSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonSupervisor")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}
