//! YAML configuration loading.
//!
//! # API pattern
//!
//! Functions that need the home directory have two forms:
//! - `fn_at(…, home: Option<&Path>)`: explicit home; used in tests
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::Config;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Daemon period used when `sync_interval_secs` is absent.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 900;

impl Config {
    /// Period between scheduled daemon runs.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.unwrap_or(DEFAULT_SYNC_INTERVAL_SECS))
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load and normalize the config file at `path`, expanding `~/` against `home`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path, home: Option<&Path>) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    normalize(config, home)
}

/// `load_at` convenience wrapper.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    load_at(path, dirs::home_dir().as_deref())
}

fn normalize(mut config: Config, home: Option<&Path>) -> Result<Config, ConfigError> {
    if config.sync_interval_secs == Some(0) {
        return Err(ConfigError::InvalidInterval);
    }
    config.data_path = expand_home(&config.data_path, home)?;
    config.ssh_key = expand_home(&config.ssh_key, home)?;
    Ok(config)
}

/// Replace a leading `~` component with `home`. Other paths pass through.
pub fn expand_home(path: &Path, home: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = home.ok_or(ConfigError::HomeNotFound)?;
    Ok(home.join(rest))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
