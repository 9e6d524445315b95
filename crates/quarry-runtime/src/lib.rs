//! Process runtime and supervision for the quarry search daemon.
//!
//! - [`process`]: one OS child process, its output streams, and shutdown
//! - [`readiness`]: deciding when a launched daemon can serve requests
//! - [`supervisor`]: the state machine that serializes lifecycle commands
#![deny(unsafe_code)]

pub mod process;
pub mod readiness;
pub mod supervisor;

pub use process::{LaunchSpec, OutputLine, ProcessHandle, describe_exit, shutdown_child};
pub use readiness::{
    HttpReadinessProbe, ProbeContext, ReadinessProbe, SentinelReadinessProbe, probe_from_settings,
};
pub use supervisor::{DaemonSupervisor, SupervisorBuilder, TargetFollower};
