//! CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quarry_cli::panel::{self, PanelOptions};
use quarry_cli::{Cli, bootstrap};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads QUARRY_*
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the panel
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = PanelOptions {
        autostart: !cli.no_autostart,
        json: cli.json,
    };

    let result = match bootstrap(&cli) {
        Ok(ctx) => panel::run(ctx, options).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
    Ok(())
}
