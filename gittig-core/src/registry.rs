//! Project registry: turns a [`Config`] into the list of mirror targets.
//!
//! Two sources are unioned, in this order:
//! 1. explicit `projects`, sorted by their config key;
//! 2. `github_projects` shorthand entries (`org/repo`), in file order.
//!
//! Pure data transformation; no filesystem or network access.

use std::collections::HashSet;
use std::path::{Component, Path};

use crate::error::ConfigError;
use crate::types::{Config, ProjectDescriptor, ProjectId};

/// Host prepended to shorthand entries.
pub const GITHUB_URL: &str = "https://github.com/";

/// Build the registry for one run.
///
/// Fails with `ConfigError::DuplicateId` if two entries, from either source,
/// resolve to the same id.
pub fn build_registry(config: &Config) -> Result<Vec<ProjectDescriptor>, ConfigError> {
    if config.default_url.trim().is_empty() {
        return Err(ConfigError::MissingValue { field: "default_url" });
    }
    if config.data_path.as_os_str().is_empty() {
        return Err(ConfigError::MissingValue { field: "data_path" });
    }

    let mut seen = HashSet::new();
    let mut registry = Vec::with_capacity(config.projects.len() + config.github_projects.len());

    for (key, project) in &config.projects {
        if project.local_name.trim().is_empty() {
            return Err(ConfigError::InvalidProject {
                key: key.clone(),
                reason: "local_name is empty".to_string(),
            });
        }
        if project.origin_url.trim().is_empty() {
            return Err(ConfigError::InvalidProject {
                key: key.clone(),
                reason: "origin_url is empty".to_string(),
            });
        }
        let id = ProjectId::from(project.local_name.as_str());
        registry.push(describe(config, &mut seen, id, project.origin_url.clone())?);
    }

    for entry in &config.github_projects {
        if !is_shorthand(entry) {
            return Err(ConfigError::InvalidShorthand {
                entry: entry.clone(),
            });
        }
        let origin = format!("{GITHUB_URL}{entry}");
        registry.push(describe(config, &mut seen, ProjectId::from(entry.as_str()), origin)?);
    }

    Ok(registry)
}

/// Restrict `registry` to the single project `id`.
pub fn select(
    registry: Vec<ProjectDescriptor>,
    id: &ProjectId,
) -> Result<Vec<ProjectDescriptor>, ConfigError> {
    let selected: Vec<_> = registry.into_iter().filter(|p| &p.id == id).collect();
    if selected.is_empty() {
        return Err(ConfigError::UnknownProject { id: id.0.clone() });
    }
    Ok(selected)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn describe(
    config: &Config,
    seen: &mut HashSet<ProjectId>,
    id: ProjectId,
    origin_url: String,
) -> Result<ProjectDescriptor, ConfigError> {
    if !is_safe_relative(&id.0) {
        return Err(ConfigError::UnsafeId { id: id.0 });
    }
    if !seen.insert(id.clone()) {
        return Err(ConfigError::DuplicateId { id: id.0 });
    }
    Ok(ProjectDescriptor {
        target_url: format!("{}{}", config.default_url, id.0),
        workspace: config.data_path.join(&id.0),
        origin_url,
        id,
    })
}

fn is_shorthand(entry: &str) -> bool {
    match entry.split_once('/') {
        Some((org, repo)) => {
            !org.trim().is_empty() && !repo.trim().is_empty() && !repo.contains('/')
        }
        None => false,
    }
}

/// `id` must be a relative path of plain components written in canonical
/// form, so that distinct ids never share a workspace directory.
fn is_safe_relative(id: &str) -> bool {
    let mut parts = Vec::new();
    for component in Path::new(id).components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => return false,
            },
            _ => return false,
        }
    }
    !parts.is_empty() && parts.join("/") == id
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
