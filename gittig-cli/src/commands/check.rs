//! `gittig check`: validate configuration and key without touching git.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use gittig_core::config::DEFAULT_CONFIG_FILE;
use gittig_core::{registry, ProjectDescriptor};
use gittig_sync::Credential;

use super::load_config;

/// Arguments for `gittig check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the YAML configuration.
    #[arg(long, short, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Emit the resolved registry as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct RegistryRow {
    #[tabled(rename = "project")]
    id: String,
    #[tabled(rename = "origin")]
    origin: String,
    #[tabled(rename = "mirror")]
    target: String,
    #[tabled(rename = "workspace")]
    workspace: String,
}

#[derive(Serialize)]
struct CheckJson<'a> {
    config: &'a PathBuf,
    ssh_key: PathBuf,
    parallel: bool,
    sync_interval_secs: u64,
    projects: &'a [ProjectDescriptor],
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config(&self.config)?;
        let projects = registry::build_registry(&config).context("invalid project registry")?;
        let credential = Credential::load(&config.ssh_key).context("invalid ssh key")?;

        if self.json {
            let payload = CheckJson {
                config: &self.config,
                ssh_key: credential.key_path().to_path_buf(),
                parallel: config.parallel,
                sync_interval_secs: config.sync_interval().as_secs(),
                projects: &projects,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize check JSON")?
            );
            return Ok(());
        }

        println!(
            "{} {} ({} project(s), {})",
            "✓".green().bold(),
            self.config.display(),
            projects.len(),
            if config.parallel { "parallel" } else { "sequential" },
        );
        println!(
            "{} ssh key {}",
            "✓".green().bold(),
            credential.key_path().display()
        );
        if projects.is_empty() {
            println!("No projects configured.");
            return Ok(());
        }

        let rows: Vec<RegistryRow> = projects
            .iter()
            .map(|p| RegistryRow {
                id: p.id.to_string(),
                origin: p.origin_url.clone(),
                target: p.target_url.clone(),
                workspace: p.workspace.display().to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
