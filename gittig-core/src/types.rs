//! Domain types for gittig.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Configuration types are (de)serializable via serde + serde_yaml.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable identifier of a mirrored project, unique within a run.
///
/// Either the configured `local_name` of an explicit project or the
/// `org/repo` string of a GitHub shorthand entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle phase of one project's sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing has been recorded for the project yet.
    #[default]
    Unknown,
    Waiting,
    Downloading,
    Uploading,
    /// Push transferred changes to the mirror.
    Done,
    /// Push found the mirror already up to date.
    DoneNothing,
    Error,
}

impl Phase {
    /// `Done`, `DoneNothing` and `Error` end a project's run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::DoneNothing | Phase::Error)
    }

    /// Human-readable label used by dashboards.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Unknown => "❓ unknown",
            Phase::Waiting => "⌛ waiting",
            Phase::Downloading => "⏬ downloading",
            Phase::Uploading => "⏫ uploading",
            Phase::Done => "✅ project updated",
            Phase::DoneNothing => "✅ already up to date",
            Phase::Error => "🚨 error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Unknown => write!(f, "unknown"),
            Phase::Waiting => write!(f, "waiting"),
            Phase::Downloading => write!(f, "downloading"),
            Phase::Uploading => write!(f, "uploading"),
            Phase::Done => write!(f, "done"),
            Phase::DoneNothing => write!(f, "done_nothing"),
            Phase::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// An explicitly configured project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Local name; becomes the project id.
    pub local_name: String,
    pub origin_url: String,
}

/// Root of the gittig YAML configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Prefix of every mirror URL; the project id is appended verbatim.
    pub default_url: String,
    /// Root directory holding one bare repository per project.
    pub data_path: PathBuf,
    /// Private key used for every push.
    pub ssh_key: PathBuf,
    #[serde(default)]
    pub parallel: bool,
    /// Shorthand `org/repo` entries mirrored from GitHub.
    #[serde(default)]
    pub github_projects: Vec<String>,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
    /// Period between scheduled daemon runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_interval_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Registry entries
// ---------------------------------------------------------------------------

/// One mirror target, resolved from configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectDescriptor {
    pub id: ProjectId,
    pub origin_url: String,
    pub target_url: String,
    /// Local bare repository; created on demand.
    pub workspace: PathBuf,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
