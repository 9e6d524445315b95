//! The interactive panel loop.
//!
//! State changes are printed by a background observer while commands are
//! read from stdin. The daemon is started when the panel opens and always
//! stopped before it returns, whether the panel ends on `quit`, end of
//! input, Ctrl-C, or an error.

use quarry_core::DaemonState;
use quarry_runtime::DaemonSupervisor;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bootstrap::PanelContext;
use crate::commands::PanelCommand;
use crate::error::CliError;
use crate::presentation::{render_change_json, render_panel, render_state_json};

/// How the panel presents itself.
#[derive(Debug, Clone, Copy)]
pub struct PanelOptions {
    /// Start the daemon when the panel opens.
    pub autostart: bool,
    /// Print JSON lines instead of the panel text.
    pub json: bool,
}

/// Run the panel until `quit`, end of input, or Ctrl-C.
pub async fn run(ctx: PanelContext, options: PanelOptions) -> Result<(), CliError> {
    run_with_input(ctx, options, BufReader::new(tokio::io::stdin())).await
}

/// Run the panel on commands read from `input`.
///
/// The daemon is shut down before returning, also when reading input or
/// applying a command failed.
async fn run_with_input<R>(
    ctx: PanelContext,
    options: PanelOptions,
    input: R,
) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
{
    let PanelContext {
        supervisor,
        selector,
        follower,
    } = ctx;

    let observer = spawn_observer(&supervisor, options.json);
    print_state(&supervisor.state(), options.json);

    let outcome = command_loop(&supervisor, &selector, options, input).await;
    if let Err(e) = &outcome {
        warn!(error = %e, "Panel stopped on error");
    }

    // Quit: the daemon must not outlive the panel
    let stopped = supervisor.shutdown().await;
    drop(selector);
    if let Err(e) = follower.await {
        warn!(error = %e, "Target follower ended abnormally");
    }
    observer.abort();
    print_state(&supervisor.state(), options.json);

    outcome?;
    stopped?;
    Ok(())
}

async fn command_loop<R>(
    supervisor: &DaemonSupervisor,
    selector: &watch::Sender<String>,
    options: PanelOptions,
    mut input: R,
) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
{
    if options.autostart {
        supervisor.start()?;
    }

    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        let read = tokio::select! {
            read = input.read_until(b'\n', &mut buf) => read?,
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                0
            }
        };
        if read == 0 {
            return Ok(());
        }

        // Undecodable bytes only make the line an unknown command
        let line = String::from_utf8_lossy(&buf);
        let command = match line.parse::<PanelCommand>() {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        debug!(%command, "Panel command");
        match command {
            PanelCommand::Start => supervisor.start()?,
            PanelCommand::Stop => supervisor.stop()?,
            PanelCommand::Restart => supervisor.restart()?,
            PanelCommand::Use(database) => {
                selector.send(database).map_err(|_| {
                    CliError::Process("database selector is no longer running".to_string())
                })?;
            }
            PanelCommand::Status => print_state(&supervisor.state(), options.json),
            PanelCommand::Help => println!("{}", PanelCommand::HELP),
            PanelCommand::Quit => return Ok(()),
        }
    }
}

fn spawn_observer(supervisor: &DaemonSupervisor, json: bool) -> JoinHandle<()> {
    let mut changes = supervisor.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    if json {
                        match render_change_json(&change) {
                            Ok(line) => println!("{line}"),
                            Err(e) => warn!(error = %e, "Failed to encode state change"),
                        }
                    } else {
                        println!("\n{}", render_panel(&change.to));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Panel observer skipped state changes");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_state(state: &DaemonState, json: bool) {
    if json {
        match render_state_json(state) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Failed to encode state"),
        }
    } else {
        println!("{}", render_panel(state));
    }
}
