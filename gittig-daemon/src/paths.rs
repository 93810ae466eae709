use std::path::{Path, PathBuf};
use std::time::Duration;

/// Quiet period before a config file change is acted upon.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// Set to any value to switch log output to JSON lines.
pub const LOG_JSON_ENV: &str = "GITTIG_LOG_JSON";

pub fn gittig_root(home: &Path) -> PathBuf {
    home.join(".gittig")
}

pub fn socket_path(home: &Path) -> PathBuf {
    gittig_root(home).join(DAEMON_SOCKET)
}
