//! `monsti signal emit` — fire a signal and print the subscribers' answers.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;

use super::{client, print_json};

#[derive(Subcommand, Debug)]
pub enum SignalCommand {
    /// Emit a signal; blocks until every subscriber has answered.
    Emit(EmitArgs),
}

#[derive(Args, Debug)]
pub struct EmitArgs {
    pub name: String,

    /// Signal arguments as a JSON document.
    #[arg(long, default_value = "null")]
    pub args: String,
}

pub fn run(command: SignalCommand) -> Result<()> {
    match command {
        SignalCommand::Emit(args) => {
            let payload: Value = serde_json::from_str(&args.args)
                .with_context(|| format!("--args is not valid JSON: {}", args.args))?;
            let results = client()?
                .emit_signal(&args.name, payload)
                .with_context(|| format!("failed to emit signal '{}'", args.name))?;
            print_json(&Value::Array(results))
        }
    }
}
