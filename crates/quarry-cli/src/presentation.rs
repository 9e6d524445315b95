//! Panel text for each daemon state.
//!
//! Format-only: nothing here inspects processes or issues commands.

use quarry_core::{DaemonState, DaemonStatus, StateChange};

/// Short status shown next to the panel title.
pub fn badge(state: &DaemonState) -> String {
    match state.status() {
        DaemonStatus::Stopped => "Stopped".to_string(),
        DaemonStatus::Starting => "Starting…".to_string(),
        DaemonStatus::Running => "Running".to_string(),
        DaemonStatus::Error => first_line(state.error_message().unwrap_or_default()).to_string(),
    }
}

/// Body of the panel for `state`.
pub fn panel_body(state: &DaemonState) -> String {
    match state {
        DaemonState::Stopped => "Backend Stopped\n\
             The search backend is not running.\n\
             Type 'start' to launch it."
            .to_string(),
        DaemonState::Starting => "Starting Quarry…\nLaunching the search backend.".to_string(),
        DaemonState::Running { target } => {
            format!("Searching database '{target}'.\nType 'use <database>' to switch.")
        }
        DaemonState::Error { message } => {
            format!("{message}\nType 'restart' to try again.")
        }
    }
}

/// Full panel: title line with badge, then the body.
pub fn render_panel(state: &DaemonState) -> String {
    format!("[Quarry] {}\n{}", badge(state), panel_body(state))
}

/// One JSON line for `change`.
pub fn render_change_json(change: &StateChange) -> Result<String, serde_json::Error> {
    serde_json::to_string(change)
}

/// One JSON line for a state snapshot.
pub fn render_state_json(state: &DaemonState) -> Result<String, serde_json::Error> {
    serde_json::to_string(state)
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}
