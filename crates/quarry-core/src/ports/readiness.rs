//! Result of waiting for a freshly launched daemon to become servable.

/// Outcome of a single readiness wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    /// The daemon is accepting requests.
    Ready,
    /// The daemon reported that it cannot start.
    Failed(String),
    /// The readiness deadline passed first.
    TimedOut,
    /// The wait was abandoned because the launch was cancelled.
    Cancelled,
}
