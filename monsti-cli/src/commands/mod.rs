pub mod config;
pub mod daemon;
pub mod node;
pub mod node_type;
pub mod signal;

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;

use monsti_daemon::{Client, DaemonSettings};

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Client for the socket named in the daemon settings below `$HOME`.
pub fn client() -> Result<Client> {
    let home = home_dir()?;
    let settings = DaemonSettings::load_at(&home).context("failed to load daemon settings")?;
    Ok(Client::new(settings.socket_path(&home)))
}

pub fn print_json(value: &Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}
