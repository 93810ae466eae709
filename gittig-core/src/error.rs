//! Error types for gittig-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading configuration or building the
/// project registry. Every variant is fatal to a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file did not exist at the given path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// A `~/` path was configured but `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("config value `{field}` must not be empty")]
    MissingValue { field: &'static str },

    #[error("project `{key}` is invalid: {reason}")]
    InvalidProject { key: String, reason: String },

    #[error("github project `{entry}` is not of the form <org>/<repo>")]
    InvalidShorthand { entry: String },

    /// The id would escape `data_path` when used as a directory name.
    #[error("project id `{id}` is not a canonical relative path")]
    UnsafeId { id: String },

    #[error("duplicate project id `{id}`")]
    DuplicateId { id: String },

    #[error("no project with id `{id}` is configured")]
    UnknownProject { id: String },

    #[error("sync_interval_secs must be greater than zero")]
    InvalidInterval,
}
