//! `gittig status`: the daemon's live status table.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gittig_daemon::{request_status, DaemonError, StatusReport};

use super::last_line;
use super::run::colored_label;

/// Arguments for `gittig status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "last message")]
    message: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        let report = match request_status(&home) {
            Ok(report) => report,
            Err(DaemonError::DaemonNotRunning { socket }) => {
                if self.json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "running": false,
                            "socket": socket.display().to_string(),
                        })
                    );
                } else {
                    println!("gittig daemon is not running. Start it with `gittig daemon start`.");
                }
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &StatusReport) {
    println!(
        "gittig v{} | daemon pid {} | up since {} | every {}s{}",
        env!("CARGO_PKG_VERSION"),
        report.pid,
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.sync_interval_secs,
        if report.run_in_progress {
            " | run in progress".yellow().to_string()
        } else {
            String::new()
        },
    );
    match &report.last_run {
        Some(last) => println!(
            "last run: {} ({} via {}) at {}: {} updated, {} up to date, {} failed",
            last.target,
            if last.summary.parallel { "parallel" } else { "sequential" },
            last.source,
            last.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
            last.summary.count(gittig_core::Phase::Done),
            last.summary.count(gittig_core::Phase::DoneNothing),
            last.summary.count(gittig_core::Phase::Error),
        ),
        None => println!("last run: never"),
    }

    if report.projects.is_empty() {
        println!("No project has been mirrored yet.");
        return;
    }
    let rows: Vec<StatusRow> = report
        .projects
        .iter()
        .map(|state| StatusRow {
            project: state.id.to_string(),
            status: colored_label(state.phase).to_string(),
            message: last_line(state),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
