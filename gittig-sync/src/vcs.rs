//! Version Control Client abstraction.
//!
//! The pipeline only talks to this trait; [`crate::git::GitCli`] is the
//! production implementation and [`crate::testing::ScriptedVcs`] the test one.

use std::path::Path;

use crate::credential::Credential;
use crate::error::VcsError;

/// Name of the remote that points at the mirror target.
pub const MIRROR_REMOTE: &str = "gittig";

/// Refspecs fetched from the origin: every branch and every pull-request head.
pub const FETCH_REFSPECS: [&str; 2] = [
    "+refs/heads/*:refs/heads/*",
    "+refs/pull/*/head:refs/pull/*/head",
];

/// Non-failure result of a client operation.
///
/// Together with `Err(VcsError)` this forms the tri-state every step
/// returns: success, benign no-op, failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation changed something (created, cloned, fetched, pushed).
    Applied,
    /// Nothing needed doing: already exists, already up to date.
    Noop,
}

/// Operations the mirror pipeline needs from a version control backend.
///
/// Implementations must be shareable across the scheduler's worker threads.
pub trait VersionControl: Send + Sync {
    /// Handle to an opened local repository.
    type Repo;

    /// Create the workspace directory if absent. Idempotent.
    fn ensure_workspace(&self, path: &Path) -> Result<Outcome, VcsError>;

    /// Bare-clone `origin_url` into `path`; an existing repository is `Noop`.
    fn clone_or_open(&self, origin_url: &str, path: &Path) -> Result<Outcome, VcsError>;

    fn open(&self, path: &Path) -> Result<Self::Repo, VcsError>;

    /// Force-fetch all branches and pull-request refs from the origin.
    fn fetch(&self, repo: &Self::Repo) -> Result<Outcome, VcsError>;

    /// Drop any existing [`MIRROR_REMOTE`] and recreate it at `target_url`.
    fn set_mirror_remote(&self, repo: &Self::Repo, target_url: &str) -> Result<Outcome, VcsError>;

    /// Push every ref to [`MIRROR_REMOTE`], pruning refs gone locally.
    fn push(&self, repo: &Self::Repo, credential: &Credential) -> Result<Outcome, VcsError>;
}

impl<T: VersionControl + ?Sized> VersionControl for &T {
    type Repo = T::Repo;

    fn ensure_workspace(&self, path: &Path) -> Result<Outcome, VcsError> {
        (**self).ensure_workspace(path)
    }

    fn clone_or_open(&self, origin_url: &str, path: &Path) -> Result<Outcome, VcsError> {
        (**self).clone_or_open(origin_url, path)
    }

    fn open(&self, path: &Path) -> Result<Self::Repo, VcsError> {
        (**self).open(path)
    }

    fn fetch(&self, repo: &Self::Repo) -> Result<Outcome, VcsError> {
        (**self).fetch(repo)
    }

    fn set_mirror_remote(&self, repo: &Self::Repo, target_url: &str) -> Result<Outcome, VcsError> {
        (**self).set_mirror_remote(repo, target_url)
    }

    fn push(&self, repo: &Self::Repo, credential: &Credential) -> Result<Outcome, VcsError> {
        (**self).push(repo, credential)
    }
}
