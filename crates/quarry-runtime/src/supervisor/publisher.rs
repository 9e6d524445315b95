//! Committed-state publication.

use quarry_core::{DaemonState, StateChange};
use tokio::sync::{broadcast, watch};
use tracing::info;

/// Capacity of the transition broadcast channel.
const CHANGES_CAPACITY: usize = 64;

/// Sole writer of the current `DaemonState`.
///
/// Every committed transition updates the watch channel first and is then
/// broadcast as a `StateChange`, so a subscriber that sees a change can
/// always read the same or a newer value through `watch`.
pub(crate) struct StatePublisher {
    state: watch::Sender<DaemonState>,
    changes: broadcast::Sender<StateChange>,
}

impl StatePublisher {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(DaemonState::Stopped);
        let (changes, _) = broadcast::channel(CHANGES_CAPACITY);
        Self { state, changes }
    }

    pub(crate) fn current(&self) -> DaemonState {
        self.state.borrow().clone()
    }

    /// Commit `to` as the current state.
    ///
    /// Returns false (and publishes nothing) when `to` equals the current state.
    pub(crate) fn transition(&self, to: DaemonState) -> bool {
        let from = self.current();
        if from == to {
            return false;
        }

        info!(from = %from, to = %to, "Daemon state changed");
        self.state.send_replace(to.clone());
        // Nobody subscribed is fine
        let _ = self.changes.send(StateChange::now(from, to));
        true
    }

    pub(crate) fn watch(&self) -> watch::Receiver<DaemonState> {
        self.state.subscribe()
    }

    pub(crate) fn changes(&self) -> broadcast::Sender<StateChange> {
        self.changes.clone()
    }
}
