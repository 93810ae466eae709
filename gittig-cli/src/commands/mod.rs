pub mod check;
pub mod daemon;
pub mod run;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};
use gittig_core::{config, Config};

/// Load the configuration, naming the file in any error.
pub fn load_config(path: &Path) -> Result<Config> {
    config::load(path).with_context(|| format!("failed to load configuration {}", path.display()))
}

/// Last log line, or an empty string.
pub fn last_line(state: &gittig_sync::ProjectState) -> String {
    state
        .log
        .last()
        .map(|line| line.text.clone())
        .unwrap_or_default()
}
