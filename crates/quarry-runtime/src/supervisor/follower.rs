//! Binds a database selection feed to `retarget`.

use quarry_core::SupervisorError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::DaemonSupervisor;

/// Follows a selector's current database and retargets the daemon to it.
pub struct TargetFollower;

impl TargetFollower {
    /// Spawn a task that calls `retarget` for every new value on `selection`.
    ///
    /// The value present when spawning is treated as already applied. The
    /// task ends when the selector drops its sender or the supervisor shuts
    /// down. It holds a supervisor clone for as long as it runs.
    pub fn spawn(
        supervisor: DaemonSupervisor,
        mut selection: watch::Receiver<String>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while selection.changed().await.is_ok() {
                let name = selection.borrow_and_update().clone();
                match supervisor.retarget(name.as_str()) {
                    Ok(()) => debug!(target_db = %name.trim(), "Forwarded database selection"),
                    Err(SupervisorError::EmptyTarget) => {
                        warn!("Ignoring empty database selection");
                    }
                    Err(e) => {
                        debug!(error = %e, "Supervisor gone, target follower exiting");
                        return;
                    }
                }
            }
            debug!("Database selector closed, target follower exiting");
        })
    }
}
