//! `gittig run`: mirror every configured project once.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use gittig_core::config::DEFAULT_CONFIG_FILE;
use gittig_core::{Phase, ProjectDescriptor, ProjectId};
use gittig_sync::pipeline::{self, RunOptions, SyncScope};
use gittig_sync::{Fanout, ProjectState, RunSummary, StatusSink, StatusTable, StopSignal};

use super::{last_line, load_config};

/// Arguments for `gittig run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the YAML configuration.
    #[arg(long, short, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Mirror all projects concurrently (overrides the config).
    #[arg(long, conflicts_with = "sequential")]
    pub parallel: bool,

    /// Mirror projects one after another (overrides the config).
    #[arg(long)]
    pub sequential: bool,

    /// Mirror only this project id.
    #[arg(long)]
    pub project: Option<String>,

    /// Emit the run summary and status table as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        gittig_daemon::init_tracing("warn");
        let config = load_config(&self.config)?;

        let options = RunOptions {
            scope: match &self.project {
                Some(id) => SyncScope::Project(ProjectId::from(id.as_str())),
                None => SyncScope::All,
            },
            parallel: self.parallel_override(),
        };

        let table = Arc::new(StatusTable::new());
        let mut sink = Fanout::new().with(table.clone());
        if !self.json {
            sink = sink.with(Arc::new(ConsoleSink));
        }

        let summary = pipeline::run(&config, &options, sink, StopSignal::new())
            .context("mirror run aborted before any project was processed")?;

        if self.json {
            print_json(&summary, table.snapshot())?;
        } else {
            print_summary(&summary, &table);
        }

        let failed = summary.count(Phase::Error);
        if failed > 0 {
            bail!("{failed} of {} project(s) failed", summary.projects.len());
        }
        Ok(())
    }

    fn parallel_override(&self) -> Option<bool> {
        match (self.parallel, self.sequential) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Prints phase changes and log lines as they happen.
struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn record_event(&self, project: &ProjectId, phase: Phase) {
        println!("{} {}", format!("[{project}]").bold(), colored_label(phase));
    }

    fn append_log(&self, project: &ProjectId, text: &str) {
        println!("{} {}", format!("[{project}]").bold(), text.bright_black());
    }

    fn run_started(&self, projects: &[ProjectDescriptor]) {
        println!("mirroring {} project(s)", projects.len());
    }
}

pub fn colored_label(phase: Phase) -> ColoredString {
    let label = phase.label();
    match phase {
        Phase::Done => label.green(),
        Phase::DoneNothing => label.green().dimmed(),
        Phase::Downloading | Phase::Uploading => label.cyan(),
        Phase::Error => label.red().bold(),
        Phase::Waiting | Phase::Unknown => label.normal(),
    }
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "last message")]
    message: String,
}

#[derive(Serialize)]
struct RunJson {
    summary: RunSummary,
    projects: Vec<ProjectState>,
}

fn print_summary(summary: &RunSummary, table: &StatusTable) {
    let rows: Vec<SummaryRow> = summary
        .projects
        .iter()
        .map(|outcome| SummaryRow {
            project: outcome.id.to_string(),
            status: outcome.phase.label().to_string(),
            message: table
                .get(&outcome.id)
                .map(|state| last_line(&state))
                .unwrap_or_default(),
        })
        .collect();

    println!();
    if rows.is_empty() {
        println!("No projects configured.");
        return;
    }
    let mut rendered = Table::new(rows);
    rendered.with(Style::rounded());
    println!("{rendered}");
    println!(
        "{} updated | {} already up to date | {} failed | {}ms ({})",
        summary.count(Phase::Done),
        summary.count(Phase::DoneNothing),
        summary.count(Phase::Error),
        summary.duration_ms,
        if summary.parallel { "parallel" } else { "sequential" },
    );
}

fn print_json(summary: &RunSummary, projects: Vec<ProjectState>) -> Result<()> {
    let payload = RunJson {
        summary: summary.clone(),
        projects,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize run JSON")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parallel: bool, sequential: bool) -> RunArgs {
        RunArgs {
            config: PathBuf::from(DEFAULT_CONFIG_FILE),
            parallel,
            sequential,
            project: None,
            json: false,
        }
    }

    #[test]
    fn parallel_flags_override_config() {
        assert_eq!(args(false, false).parallel_override(), None);
        assert_eq!(args(true, false).parallel_override(), Some(true));
        assert_eq!(args(false, true).parallel_override(), Some(false));
    }
}
