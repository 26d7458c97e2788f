//! `monsti daemon` — foreground runtime and lifecycle over the socket.

use anyhow::{Context, Result};
use clap::Subcommand;

use monsti_daemon::{start_blocking, DaemonError};

use super::{client, home_dir, print_json};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground.
    Start,
    /// Request graceful daemon shutdown over the socket.
    Stop,
    /// Query daemon runtime status over the socket.
    Status,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    match command {
        DaemonCommand::Start => {
            let home = home_dir()?;
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match client()?.stop() {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let client = client()?;
            match client.status() {
                Ok(status) => print_json(&status)?,
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    print_json(&serde_json::json!({
                        "running": false,
                        "socket": client.socket().display().to_string(),
                    }))?;
                }
                Err(err) => return Err(err).context("failed to query daemon status"),
            }
        }
    }

    Ok(())
}
