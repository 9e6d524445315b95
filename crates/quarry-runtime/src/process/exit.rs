//! Human-readable exit status descriptions.

use std::process::ExitStatus;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

/// Describe how a process ended, e.g. `exit code 3` or `signal 9 (SIGKILL)`.
pub fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }

    #[cfg(unix)]
    {
        if let Some(signal) = status.signal() {
            return match nix::sys::signal::Signal::try_from(signal) {
                Ok(named) => format!("signal {signal} ({})", named.as_str()),
                Err(_) => format!("signal {signal}"),
            };
        }
    }

    "unknown exit status".to_string()
}
