//! Stopping the daemon process: SIGTERM, a grace period, then SIGKILL.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

#[cfg(unix)]
use tokio::time::timeout;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Stop the daemon's child process and reap it.
///
/// A child that already exited is only reaped. Otherwise it gets SIGTERM
/// and `grace` to exit before SIGKILL; off Unix it is killed outright.
///
/// Returns the exit status once the process has been reaped, so no
/// zombie is left behind on any path.
pub async fn shutdown_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        debug!(?status, "Child already exited before shutdown");
        return Ok(status);
    }

    #[cfg(unix)]
    {
        shutdown_unix(child, grace).await
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        force_kill(child).await
    }
}

#[cfg(unix)]
async fn shutdown_unix(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // Already reaped by a concurrent wait
        return child.wait().await;
    };
    let raw_pid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "PID out of range"))?;

    match signal::kill(Pid::from_raw(raw_pid), Signal::SIGTERM) {
        Ok(()) => {}
        // Exited between try_wait and the signal
        Err(nix::errno::Errno::ESRCH) => return child.wait().await,
        Err(e) => return Err(io::Error::other(e)),
    }

    if let Ok(result) = timeout(grace, child.wait()).await {
        return result;
    }

    warn!(
        pid,
        grace_ms = grace.as_millis(),
        "Daemon ignored SIGTERM; sending SIGKILL"
    );
    // Child::kill sends SIGKILL
    child.kill().await?;
    child.wait().await
}

#[cfg(not(unix))]
async fn force_kill(child: &mut Child) -> io::Result<ExitStatus> {
    child.kill().await?;
    child.wait().await
}
