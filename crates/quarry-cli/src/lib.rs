//! Terminal panel for the quarry search backend.
//!
//! The panel starts the daemon when it opens, renders every state change,
//! and reads lifecycle commands from stdin.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tempfile as _;

// Used by the binary only
use anyhow as _;
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod panel;
pub mod parser;
pub mod presentation;

pub use bootstrap::{PanelContext, bootstrap, settings_from_cli};
pub use commands::PanelCommand;
pub use error::CliError;
pub use parser::Cli;
