//! `gittig daemon`: foreground daemon and socket control commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use gittig_core::config::DEFAULT_CONFIG_FILE;
use gittig_core::Phase;
use gittig_daemon::paths::socket_path;
use gittig_daemon::{request_status, request_stop, request_sync, start_blocking, DaemonError};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (scheduler + config watcher + socket).
    Start {
        /// Path to the YAML configuration.
        #[arg(long, short, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Print the daemon's raw status as JSON.
    Status,
    /// Ask the daemon to run now and wait for the result.
    Sync {
        /// Mirror only this project id.
        #[arg(long)]
        project: Option<String>,
    },
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        DaemonCommand::Start { config } => {
            let config = std::path::absolute(&config)
                .with_context(|| format!("invalid config path {}", config.display()))?;
            start_blocking(&home, &config).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Sync { project } => {
            let record = request_sync(&home, project).context("daemon sync failed")?;
            let summary = &record.summary;
            println!(
                "'{}' mirrored ({} updated, {} up to date, {} failed, {}ms)",
                record.target,
                summary.count(Phase::Done),
                summary.count(Phase::DoneNothing),
                summary.count(Phase::Error),
                summary.duration_ms,
            );
            for outcome in &summary.projects {
                println!("  {}  {}", outcome.phase.label(), outcome.id);
            }
            if !summary.is_success() {
                anyhow::bail!("{} project(s) failed", summary.count(Phase::Error));
            }
        }
    }

    Ok(())
}
