//! Control requests issued by observers and target selectors.

use std::fmt;

use super::Target;

/// A request to change the daemon lifecycle.
///
/// Commands are queued by the supervisor and applied strictly one at a
/// time, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Launch the daemon unless it is already starting or running.
    Start,
    /// Terminate the daemon (graceful signal, then forced kill).
    Stop,
    /// Stop and relaunch as one supervised operation.
    Restart,
    /// Bind the daemon to another database.
    Retarget(Target),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
            Self::Restart => f.write_str("restart"),
            Self::Retarget(target) => write!(f, "retarget({target})"),
        }
    }
}
