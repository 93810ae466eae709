//! Error types for gittig-sync.
//!
//! Run-fatal errors ([`SyncError`], [`CredentialError`]) abort before any
//! project is scheduled. [`VcsError`] is project-scoped: it ends one
//! project's pipeline in `Phase::Error` and never affects the others.

use std::path::PathBuf;

use thiserror::Error;

use gittig_core::ConfigError;

/// Errors that abort a whole run before scheduling.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),
}

/// The private key used for pushes could not be loaded.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("ssh key not found at {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ssh key at {path} is not a private key: {reason}")]
    Unparsable { path: PathBuf, reason: String },

    #[error("ssh key at {path} is passphrase-protected; gittig cannot unlock it")]
    Encrypted { path: PathBuf },
}

/// Failure of a single Version Control Client operation.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The local workspace directory could not be created.
    #[error("cannot create {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Clone, open, fetch or push failed for a reason other than authentication.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The mirror remote rejected the credential.
    #[error("authentication rejected: {message}")]
    Auth { message: String },

    /// The mirror remote could not be removed or recreated.
    #[error("remote configuration error: {message}")]
    RemoteConfig { message: String },
}

impl VcsError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn remote_config(message: impl Into<String>) -> Self {
        Self::RemoteConfig {
            message: message.into(),
        }
    }
}

/// Convenience constructor for [`VcsError::Workspace`].
pub(crate) fn workspace_err(path: impl Into<PathBuf>, source: std::io::Error) -> VcsError {
    VcsError::Workspace {
        path: path.into(),
        source,
    }
}
