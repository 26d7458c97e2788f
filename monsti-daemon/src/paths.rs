use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const DAEMON_SETTINGS: &str = "daemon.yaml";

/// Quiet period before the first "still waiting" log for a signal response.
pub const SIGNAL_GRACE: Duration = Duration::from_secs(1);
/// Interval between subsequent "still waiting" logs.
pub const SIGNAL_REMINDER: Duration = Duration::from_secs(30);

pub fn monsti_root(home: &Path) -> PathBuf {
    home.join(".monsti")
}

pub fn socket_path(home: &Path) -> PathBuf {
    monsti_root(home).join(DAEMON_SOCKET)
}

pub fn settings_path(home: &Path) -> PathBuf {
    monsti_root(home).join(DAEMON_SETTINGS)
}
