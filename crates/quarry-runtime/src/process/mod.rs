//! Process infrastructure for the supervised daemon.
//!
//! # Structure
//!
//! - `ProcessHandle` - one launched child: wait, liveness, terminate, output fan-out
//! - `LaunchSpec` - executable, rendered arguments, and environment
//! - `shutdown_child` - graceful signal with forced-kill escalation and reaping
//! - stream readers and the stderr tail used for exit diagnostics
//!
//! Nothing here decides *when* to launch or stop; that policy lives in
//! the supervisor.

mod exit;
mod handle;
pub mod shutdown;
mod stream;
mod tail;

pub use exit::describe_exit;
pub use handle::{LaunchSpec, OutputLine, ProcessHandle};
pub use shutdown::shutdown_child;
pub use tail::StderrTail;
