//! Shared run entrypoint used by the CLI and the daemon.

use gittig_core::{registry, Config, ProjectDescriptor, ProjectId};

use crate::credential::Credential;
use crate::error::SyncError;
use crate::git::GitCli;
use crate::scheduler::{RunSummary, Scheduler, StopSignal};
use crate::sink::StatusSink;
use crate::vcs::VersionControl;

/// Which projects a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncScope {
    /// Every project in the registry.
    #[default]
    All,
    /// A single project, by id.
    Project(ProjectId),
}

/// Per-run overrides on top of the configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub scope: SyncScope,
    /// Overrides `Config::parallel` when set.
    pub parallel: Option<bool>,
}

/// Build the registry and restrict it to `scope`.
pub fn plan(config: &Config, scope: &SyncScope) -> Result<Vec<ProjectDescriptor>, SyncError> {
    let projects = registry::build_registry(config)?;
    Ok(match scope {
        SyncScope::All => projects,
        SyncScope::Project(id) => registry::select(projects, id)?,
    })
}

/// Run the mirror sync for `options.scope` with the system `git`.
///
/// Registry and credential errors abort before any project is processed.
pub fn run<S: StatusSink>(
    config: &Config,
    options: &RunOptions,
    sink: S,
    stop: StopSignal,
) -> Result<RunSummary, SyncError> {
    run_with(GitCli::new(), config, options, sink, stop)
}

/// [`run`] against any [`VersionControl`] backend.
pub fn run_with<V, S>(
    vcs: V,
    config: &Config,
    options: &RunOptions,
    sink: S,
    stop: StopSignal,
) -> Result<RunSummary, SyncError>
where
    V: VersionControl,
    S: StatusSink,
{
    let projects = plan(config, &options.scope)?;
    let credential = Credential::load(&config.ssh_key)?;
    let parallel = options.parallel.unwrap_or(config.parallel);

    let scheduler = Scheduler::new(vcs, sink, credential).with_stop_signal(stop);
    Ok(scheduler.start(&projects, parallel))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    use gittig_core::{ConfigError, Phase, ProjectConfig};
    use tempfile::TempDir;

    use super::*;
    use crate::error::CredentialError;
    use crate::state::StatusTable;
    use crate::testing::{write_test_key, ScriptedVcs};

    fn config(dir: &TempDir) -> Config {
        let mut projects = BTreeMap::new();
        projects.insert(
            "platform/api".to_string(),
            ProjectConfig {
                local_name: "platform/api".to_string(),
                origin_url: "https://git.example.com/platform/api.git".to_string(),
            },
        );
        Config {
            default_url: "git@mirror.example.com:".to_string(),
            data_path: dir.path().join("data"),
            ssh_key: write_test_key(dir.path()),
            parallel: false,
            github_projects: vec!["acme/widgets".to_string()],
            projects,
            sync_interval_secs: None,
        }
    }

    #[test]
    fn run_all_processes_whole_registry() {
        let dir = TempDir::new().unwrap();
        let table = Arc::new(StatusTable::new());
        let summary = run_with(
            ScriptedVcs::new(),
            &config(&dir),
            &RunOptions::default(),
            table.clone(),
            StopSignal::new(),
        )
        .expect("run");

        assert_eq!(summary.projects.len(), 2);
        assert!(summary.is_success());
        assert_eq!(table.phase(&"acme/widgets".into()), Phase::Done);
    }

    #[test]
    fn single_project_scope() {
        let dir = TempDir::new().unwrap();
        let options = RunOptions {
            scope: SyncScope::Project("acme/widgets".into()),
            parallel: Some(true),
        };
        let summary = run_with(
            ScriptedVcs::new(),
            &config(&dir),
            &options,
            StatusTable::new(),
            StopSignal::new(),
        )
        .expect("run");
        assert_eq!(summary.projects.len(), 1);
        assert!(summary.parallel);
    }

    #[test]
    fn unknown_project_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = plan(&config(&dir), &SyncScope::Project("nope".into())).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Config(ConfigError::UnknownProject { .. })
        ));
    }

    #[test]
    fn missing_key_aborts_before_any_project() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.ssh_key = PathBuf::from("/nonexistent/id_ed25519");
        let vcs = ScriptedVcs::new();

        let err = run_with(&vcs, &cfg, &RunOptions::default(), StatusTable::new(), StopSignal::new())
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Credential(CredentialError::NotFound { .. })
        ));
        assert!(vcs.calls().is_empty());
    }
}
