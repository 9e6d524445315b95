//! Daemon supervision.
//!
//! # Structure
//!
//! - `DaemonSupervisor` - cloneable handle: commands, state snapshot, subscriptions
//! - `ControlTask` - the single task that owns the state and the process
//! - `StatePublisher` - commits transitions to the watch and broadcast channels
//! - `TargetFollower` - forwards database selections to `retarget`
//!
//! Commands are queued on an unbounded channel and applied in arrival
//! order. Process exit and readiness results are delivered to the same
//! loop, so no two transitions ever run concurrently.

mod control;
mod follower;
mod handle;
mod publisher;

pub use follower::TargetFollower;
pub use handle::{DaemonSupervisor, SupervisorBuilder};
