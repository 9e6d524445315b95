//! Domain types for the daemon lifecycle.

mod command;
mod state;
mod target;

pub use command::Command;
pub use state::{DaemonState, DaemonStatus, StateChange};
pub use target::Target;
