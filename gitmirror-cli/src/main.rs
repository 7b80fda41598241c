//! gitmirror: serve a git repository as a static site, updated by push
//! notifications.
//!
//! # Usage
//!
//! ```text
//! gitmirror serve  [--config <path>] [--json-logs]
//! gitmirror init   [--config <path>] [--force]
//! gitmirror sync   [--config <path>]
//! gitmirror status [--config <path>] [--json]
//! gitmirror logs   [--config <path>] [--lines <n>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, logs::LogsArgs, serve::ServeArgs, status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "gitmirror",
    version,
    about = "Mirror a git repository and serve it as static content",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the notification and content listeners in the foreground.
    Serve(ServeArgs),

    /// Write a configuration file seeded from the environment.
    Init(InitArgs),

    /// Bring the active partition up to date once and exit.
    Sync(SyncArgs),

    /// Query a running server's health endpoint.
    Status(StatusArgs),

    /// Print recent lines from the server log.
    Logs(LogsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Logs(args) => args.run(),
    }
}
