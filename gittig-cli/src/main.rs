//! gittig: mirror git repositories to a self-hosted remote.
//!
//! # Usage
//!
//! ```text
//! gittig run [--config <path>] [--parallel|--sequential] [--project <id>] [--json]
//! gittig check [--config <path>] [--json]
//! gittig status [--json]
//! gittig daemon start [--config <path>] | stop | status | sync [--project <id>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check::CheckArgs, daemon::DaemonCommand, run::RunArgs, status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "gittig",
    version,
    about = "Mirror git repositories to a self-hosted remote",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mirror every configured project once and exit.
    Run(RunArgs),

    /// Validate the configuration and ssh key, then list the projects.
    Check(CheckArgs),

    /// Show the running daemon's status table.
    Status(StatusArgs),

    /// Run or control the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
