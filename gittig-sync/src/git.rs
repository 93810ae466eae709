//! [`VersionControl`] backed by the `git` executable.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::credential::Credential;
use crate::error::{workspace_err, VcsError};
use crate::vcs::{Outcome, VersionControl, FETCH_REFSPECS, MIRROR_REMOTE};

/// Runs `git` subprocesses. Prompts are disabled so a missing credential
/// fails instead of blocking the worker.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

/// A bare repository on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::with_program("git")
    }

    /// Use a specific `git` binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.env("GIT_TERMINAL_PROMPT", "0").arg("-C").arg(dir);
        cmd
    }

    fn output(&self, mut cmd: Command, what: &str) -> Result<Output, VcsError> {
        tracing::trace!("running {cmd:?}");
        cmd.output()
            .map_err(|e| VcsError::transport(format!("could not run git {what}: {e}")))
    }

    fn ref_snapshot(&self, repo: &GitRepo) -> Result<String, VcsError> {
        let mut cmd = self.command(&repo.path);
        cmd.args(["for-each-ref", "--format=%(objectname) %(refname)"]);
        let output = self.output(cmd, "for-each-ref")?;
        if !output.status.success() {
            return Err(VcsError::transport(stderr_message(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn remotes(&self, repo: &GitRepo) -> Result<Vec<String>, VcsError> {
        let mut cmd = self.command(&repo.path);
        cmd.arg("remote");
        let output = self.output(cmd, "remote")?;
        if !output.status.success() {
            return Err(VcsError::remote_config(stderr_message(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

impl VersionControl for GitCli {
    type Repo = GitRepo;

    fn ensure_workspace(&self, path: &Path) -> Result<Outcome, VcsError> {
        if path.is_dir() {
            return Ok(Outcome::Noop);
        }
        std::fs::create_dir_all(path).map_err(|e| workspace_err(path, e))?;
        Ok(Outcome::Applied)
    }

    fn clone_or_open(&self, origin_url: &str, path: &Path) -> Result<Outcome, VcsError> {
        if is_repository(path) {
            return Ok(Outcome::Noop);
        }
        let mut cmd = Command::new(&self.program);
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .args(["clone", "--bare", "--quiet", "--"])
            .arg(origin_url)
            .arg(path);
        let output = self.output(cmd, "clone")?;
        if !output.status.success() {
            return Err(VcsError::transport(stderr_message(&output)));
        }
        Ok(Outcome::Applied)
    }

    fn open(&self, path: &Path) -> Result<GitRepo, VcsError> {
        let mut cmd = self.command(path);
        cmd.args(["rev-parse", "--git-dir"]);
        let output = self.output(cmd, "rev-parse")?;
        if !output.status.success() {
            return Err(VcsError::transport(stderr_message(&output)));
        }
        Ok(GitRepo {
            path: path.to_path_buf(),
        })
    }

    fn fetch(&self, repo: &GitRepo) -> Result<Outcome, VcsError> {
        let before = self.ref_snapshot(repo)?;

        let mut cmd = self.command(&repo.path);
        cmd.args(["fetch", "--force", "--tags", "--prune", "--quiet", "origin"])
            .args(FETCH_REFSPECS);
        let output = self.output(cmd, "fetch")?;
        if !output.status.success() {
            return Err(VcsError::transport(stderr_message(&output)));
        }

        let after = self.ref_snapshot(repo)?;
        Ok(if before == after {
            Outcome::Noop
        } else {
            Outcome::Applied
        })
    }

    fn set_mirror_remote(&self, repo: &GitRepo, target_url: &str) -> Result<Outcome, VcsError> {
        if self.remotes(repo)?.iter().any(|r| r == MIRROR_REMOTE) {
            let mut cmd = self.command(&repo.path);
            cmd.args(["remote", "remove", MIRROR_REMOTE]);
            let output = self.output(cmd, "remote remove")?;
            if !output.status.success() {
                return Err(VcsError::remote_config(stderr_message(&output)));
            }
        }

        let mut cmd = self.command(&repo.path);
        cmd.args(["remote", "add", MIRROR_REMOTE, target_url]);
        let output = self.output(cmd, "remote add")?;
        if !output.status.success() {
            return Err(VcsError::remote_config(stderr_message(&output)));
        }
        Ok(Outcome::Applied)
    }

    fn push(&self, repo: &GitRepo, credential: &Credential) -> Result<Outcome, VcsError> {
        let mut cmd = self.command(&repo.path);
        cmd.env("GIT_SSH_COMMAND", credential.ssh_command())
            .args(["push", "--mirror", "--porcelain", MIRROR_REMOTE]);
        let output = self.output(cmd, "push")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(classify_push_failure(&stdout, &stderr));
        }
        Ok(classify_push(&stdout, &stderr))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A bare repository (`HEAD` + `objects/`) or a work tree with `.git`.
fn is_repository(path: &Path) -> bool {
    (path.join("HEAD").is_file() && path.join("objects").is_dir()) || path.join(".git").exists()
}

fn stderr_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = stderr.trim();
    if message.is_empty() {
        format!("git exited with {}", output.status)
    } else {
        message.to_string()
    }
}

/// Porcelain push lines are `<flag>\t<from>:<to>\t<summary>`; `=` means the
/// ref was already up to date.
fn classify_push(stdout: &str, stderr: &str) -> Outcome {
    if stderr.contains("Everything up-to-date") {
        return Outcome::Noop;
    }
    let changed = stdout.lines().any(|line| {
        let mut chars = line.chars();
        let flag = chars.next();
        chars.next() == Some('\t') && flag != Some('=')
    });
    if changed {
        Outcome::Applied
    } else {
        Outcome::Noop
    }
}

fn classify_push_failure(stdout: &str, stderr: &str) -> VcsError {
    let lower = stderr.to_ascii_lowercase();
    let message = if stderr.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.trim().to_string()
    };
    let auth_markers = [
        "permission denied",
        "authentication failed",
        "could not read username",
        "host key verification failed",
    ];
    if auth_markers.iter().any(|m| lower.contains(m)) {
        VcsError::auth(message)
    } else {
        VcsError::transport(message)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
