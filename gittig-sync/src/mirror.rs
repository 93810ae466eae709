//! Per-project mirror pipeline.
//!
//! workspace → clone → open → fetch → retarget → push
//!
//! Each step either succeeds, is a benign no-op (the pipeline proceeds), or
//! fails (the pipeline logs `<step> failed: <error>` and ends in `Error`).

use std::fmt;

use gittig_core::{Phase, ProjectDescriptor};

use crate::credential::Credential;
use crate::error::VcsError;
use crate::sink::StatusSink;
use crate::vcs::{Outcome, VersionControl, MIRROR_REMOTE};

/// One step of the pipeline, named in failure log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Workspace,
    Clone,
    Open,
    Fetch,
    Retarget,
    Push,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Workspace => "creating workspace",
            Step::Clone => "clone",
            Step::Open => "opening repository",
            Step::Fetch => "fetch",
            Step::Retarget => "setting mirror remote",
            Step::Push => "push",
        };
        f.write_str(name)
    }
}

struct StepFailure {
    step: Step,
    error: VcsError,
}

fn at(step: Step) -> impl FnOnce(VcsError) -> StepFailure {
    move |error| StepFailure { step, error }
}

/// Drives one project through every step against a [`VersionControl`]
/// backend, reporting to a [`StatusSink`].
pub struct MirrorPipeline<'a, V, S: ?Sized> {
    vcs: &'a V,
    sink: &'a S,
    credential: &'a Credential,
}

impl<'a, V, S> MirrorPipeline<'a, V, S>
where
    V: VersionControl,
    S: StatusSink + ?Sized,
{
    pub fn new(vcs: &'a V, sink: &'a S, credential: &'a Credential) -> Self {
        Self {
            vcs,
            sink,
            credential,
        }
    }

    /// Run every step for `project` and return its terminal phase.
    pub fn run(&self, project: &ProjectDescriptor) -> Phase {
        let id = &project.id;
        self.sink.record_event(id, Phase::Waiting);

        let phase = match self.steps(project) {
            Ok(phase) => phase,
            Err(StepFailure { step, error }) => {
                tracing::warn!("[{id}] {step} failed: {error}");
                self.sink.append_log(id, &format!("{step} failed: {error}"));
                Phase::Error
            }
        };
        self.sink.record_event(id, phase);
        phase
    }

    fn steps(&self, project: &ProjectDescriptor) -> Result<Phase, StepFailure> {
        let id = &project.id;
        let log = |text: &str| self.sink.append_log(id, text);

        self.vcs
            .ensure_workspace(&project.workspace)
            .map_err(at(Step::Workspace))?;

        self.sink.record_event(id, Phase::Downloading);
        match self
            .vcs
            .clone_or_open(&project.origin_url, &project.workspace)
            .map_err(at(Step::Clone))?
        {
            Outcome::Applied => log(&format!("cloned {}", project.origin_url)),
            Outcome::Noop => log("repository already exists, opening it"),
        }

        let repo = self.vcs.open(&project.workspace).map_err(at(Step::Open))?;

        self.sink.record_event(id, Phase::Downloading);
        match self.vcs.fetch(&repo).map_err(at(Step::Fetch))? {
            Outcome::Applied => log("fetched updates from origin"),
            Outcome::Noop => log("already up to date with origin"),
        }

        self.vcs
            .set_mirror_remote(&repo, &project.target_url)
            .map_err(at(Step::Retarget))?;
        log(&format!(
            "mirror remote `{MIRROR_REMOTE}` points at {}",
            project.target_url
        ));

        self.sink.record_event(id, Phase::Uploading);
        let pushed = self
            .vcs
            .push(&repo, self.credential)
            .map_err(at(Step::Push))?;
        Ok(match pushed {
            Outcome::Applied => {
                log(&format!("pushed to {}", project.target_url));
                Phase::Done
            }
            Outcome::Noop => {
                log("mirror already up to date, nothing to push");
                Phase::DoneNothing
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StatusTable;
    use crate::testing::{descriptor, test_credential, Op, Reply, Script, ScriptedVcs};
    use tempfile::TempDir;

    fn run(vcs: &ScriptedVcs) -> (Phase, Vec<String>) {
        let dir = TempDir::new().unwrap();
        let credential = test_credential(dir.path());
        let table = StatusTable::new();
        let project = descriptor("svc");
        let phase = MirrorPipeline::new(vcs, &table, &credential).run(&project);
        let log = table
            .get(&project.id)
            .map(|s| s.log.into_iter().map(|l| l.text).collect())
            .unwrap_or_default();
        (phase, log)
    }

    #[test]
    fn all_success_is_done_with_four_lines() {
        let vcs = ScriptedVcs::new();
        let (phase, log) = run(&vcs);
        assert_eq!(phase, Phase::Done);
        assert_eq!(log.len(), 4, "{log:?}");
        assert!(log[0].starts_with("cloned "));
        assert_eq!(log[1], "fetched updates from origin");
        assert!(log[2].contains("mirror remote `gittig`"));
        assert!(log[3].starts_with("pushed to "));
    }

    #[test]
    fn nothing_to_fetch_or_push_is_done_nothing() {
        let vcs = ScriptedVcs::new().with_default(
            Script::success()
                .on_clone(Reply::Noop)
                .on_fetch(Reply::Noop)
                .on_push(Reply::Noop),
        );
        let (phase, log) = run(&vcs);
        assert_eq!(phase, Phase::DoneNothing);
        assert_eq!(log[0], "repository already exists, opening it");
        assert_eq!(log[1], "already up to date with origin");
        assert_eq!(log[3], "mirror already up to date, nothing to push");
    }

    #[test]
    fn push_auth_failure_ends_in_error() {
        let vcs = ScriptedVcs::new().with_default(Script::success().on_push(Reply::AuthFail));
        let (phase, log) = run(&vcs);
        assert_eq!(phase, Phase::Error);
        let last = log.last().expect("log");
        assert!(last.starts_with("push failed: authentication rejected"), "{last}");
    }

    #[test]
    fn workspace_failure_skips_every_later_step() {
        let vcs = ScriptedVcs::new().with_default(Script::success().on_workspace(Reply::Fail));
        let (phase, log) = run(&vcs);
        assert_eq!(phase, Phase::Error);
        assert_eq!(log.len(), 1);
        assert!(log[0].starts_with("creating workspace failed"));
        assert_eq!(vcs.ops(), vec![Op::EnsureWorkspace]);
    }

    #[test]
    fn retarget_failure_never_pushes() {
        let vcs = ScriptedVcs::new().with_default(Script::success().on_retarget(Reply::Fail));
        let (phase, log) = run(&vcs);
        assert_eq!(phase, Phase::Error);
        assert!(log.last().unwrap().starts_with("setting mirror remote failed"));
        assert!(!vcs.ops().contains(&Op::Push));
    }

    #[test]
    fn open_failure_is_its_own_step() {
        let vcs = ScriptedVcs::new().with_default(Script::success().on_open(Reply::Fail));
        let (phase, log) = run(&vcs);
        assert_eq!(phase, Phase::Error);
        assert_eq!(log.len(), 2);
        assert!(log[1].starts_with("opening repository failed"));
    }

    #[test]
    fn steps_run_in_order() {
        let vcs = ScriptedVcs::new();
        run(&vcs);
        assert_eq!(
            vcs.ops(),
            vec![
                Op::EnsureWorkspace,
                Op::Clone,
                Op::Open,
                Op::Fetch,
                Op::SetMirrorRemote,
                Op::Push
            ]
        );
    }
}
