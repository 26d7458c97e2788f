//! Daemon settings loaded from `<home>/.monsti/daemon.yaml`.
//!
//! ```yaml
//! sites:
//!   example:
//!     nodes_path: /srv/monsti/example/nodes
//!     config_path: /srv/monsti/example/config
//! mail:
//!   debug: false
//!   host: smtp.example.com
//!   port: 587
//!   username: monsti
//!   password: secret
//! signals:
//!   grace_secs: 1
//!   reminder_secs: 30
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, DaemonError};
use crate::paths::{settings_path, socket_path, SIGNAL_GRACE, SIGNAL_REMINDER};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DaemonSettings {
    #[serde(default)]
    pub sites: BTreeMap<String, SiteSettings>,
    #[serde(default)]
    pub mail: MailSettings,
    #[serde(default)]
    pub signals: SignalSettings,
    /// Overrides `<home>/.monsti/daemon.sock`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<PathBuf>,
}

/// Filesystem locations of one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSettings {
    pub nodes_path: PathBuf,
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSettings {
    /// Log messages instead of relaying them over SMTP.
    #[serde(default = "default_true")]
    pub debug: bool,
    #[serde(default = "default_mail_host")]
    pub host: String,
    #[serde(default = "default_mail_port")]
    pub port: u16,
    /// SMTP login. Without it the relay is used unauthenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            debug: true,
            host: default_mail_host(),
            port: default_mail_port(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSettings {
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    #[serde(default = "default_reminder_secs")]
    pub reminder_secs: u64,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
            reminder_secs: default_reminder_secs(),
        }
    }
}

impl SignalSettings {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn reminder(&self) -> Duration {
        Duration::from_secs(self.reminder_secs.max(1))
    }
}

impl DaemonSettings {
    /// Loads settings below `home`. A missing file yields the defaults.
    pub fn load_at(home: &Path) -> Result<Self, DaemonError> {
        Self::load_file(&settings_path(home))
    }

    pub fn load_file(path: &Path) -> Result<Self, DaemonError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no daemon settings; using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(io_err(path, err)),
        };
        serde_yaml::from_str(&contents).map_err(|source| DaemonError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn socket_path(&self, home: &Path) -> PathBuf {
        self.socket.clone().unwrap_or_else(|| socket_path(home))
    }

    pub fn site(&self, name: &str) -> Result<&SiteSettings, DaemonError> {
        self.sites
            .get(name)
            .ok_or_else(|| DaemonError::UnknownSite(name.to_owned()))
    }
}

fn default_true() -> bool {
    true
}

fn default_mail_host() -> String {
    "localhost".to_string()
}

fn default_mail_port() -> u16 {
    587
}

fn default_grace_secs() -> u64 {
    SIGNAL_GRACE.as_secs()
}

fn default_reminder_secs() -> u64 {
    SIGNAL_REMINDER.as_secs()
}
