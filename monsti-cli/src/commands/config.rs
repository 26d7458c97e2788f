//! `monsti config get` — dotted site configuration lookups.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use super::{client, print_json};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the value at `module.key.path`, or null when absent.
    Get(GetArgs),
}

#[derive(Args, Debug)]
pub struct GetArgs {
    pub site: String,
    /// Dotted name, e.g. `core.owner.email`.
    pub name: String,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Get(args) => {
            let value = client()?
                .get_site_config(&args.site, &args.name)
                .with_context(|| format!("failed to read config '{}'", args.name))?;
            print_json(&value.value.unwrap_or_default())
        }
    }
}
