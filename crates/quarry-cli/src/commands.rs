//! Commands typed into the panel.

use std::fmt;
use std::str::FromStr;

use crate::error::CliError;

/// One line of panel input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    Start,
    Stop,
    Restart,
    /// Switch the daemon to another database.
    Use(String),
    Status,
    Help,
    /// Stop the daemon and leave.
    Quit,
}

impl PanelCommand {
    /// Help text listing every command.
    pub const HELP: &'static str = "\
Commands:
  start            Start the search backend
  stop             Stop the search backend
  restart          Restart the search backend
  use <database>   Switch to another database
  status           Show the current state
  help             Show this help
  quit, q          Stop the backend and exit";
}

impl FromStr for PanelCommand {
    type Err = CliError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));

        let command = match word.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "restart" => Self::Restart,
            "use" | "db" => {
                if rest.is_empty() {
                    return Err(CliError::Arguments("usage: use <database>".to_string()));
                }
                return Ok(Self::Use(rest.to_string()));
            }
            "status" | "" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            other => {
                return Err(CliError::Arguments(format!(
                    "unknown command '{other}' (type 'help')"
                )));
            }
        };

        if rest.is_empty() {
            Ok(command)
        } else {
            Err(CliError::Arguments(format!("'{word}' takes no arguments")))
        }
    }
}

impl fmt::Display for PanelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
            Self::Restart => f.write_str("restart"),
            Self::Use(database) => write!(f, "use {database}"),
            Self::Status => f.write_str("status"),
            Self::Help => f.write_str("help"),
            Self::Quit => f.write_str("quit"),
        }
    }
}
