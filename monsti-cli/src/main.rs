//! Monsti daemon control and inspection CLI.
//!
//! # Usage
//!
//! ```text
//! monsti daemon start|stop|status
//! monsti node get|children|remove|rename <site> ...
//! monsti type list|fields
//! monsti type show <id>
//! monsti type addable <site> <node-type>
//! monsti config get <site> <module.key>
//! monsti signal emit <name> [--args <json>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, node::NodeCommand, node_type::TypeCommand,
    signal::SignalCommand,
};

#[derive(Parser, Debug)]
#[command(
    name = "monsti",
    version,
    about = "Run and inspect the Monsti CMS daemon",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run, stop or query the daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Read and manage nodes of a site.
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Inspect registered node types.
    Type {
        #[command(subcommand)]
        command: TypeCommand,
    },

    /// Look up site configuration values.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Emit signals to connected subscribers.
    Signal {
        #[command(subcommand)]
        command: SignalCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Node { command } => commands::node::run(command),
        Commands::Type { command } => commands::node_type::run(command),
        Commands::Config { command } => commands::config::run(command),
        Commands::Signal { command } => commands::signal::run(command),
    }
}
