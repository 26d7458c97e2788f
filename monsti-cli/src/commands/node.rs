//! `monsti node` — read, list, remove and move nodes.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use super::{client, print_json};

#[derive(Subcommand, Debug)]
pub enum NodeCommand {
    /// Print a node document.
    Get(NodeArgs),
    /// List the children of a node.
    Children(ChildrenArgs),
    /// Remove a node and everything below it.
    Remove(NodeArgs),
    /// Move a node to a new path.
    Rename(RenameArgs),
}

#[derive(Args, Debug)]
pub struct NodeArgs {
    pub site: String,
    pub path: String,
}

#[derive(Args, Debug)]
pub struct ChildrenArgs {
    pub site: String,
    #[arg(default_value = "/")]
    pub path: String,

    /// Emit the child documents as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RenameArgs {
    pub site: String,
    pub source: String,
    pub target: String,
}

#[derive(Tabled)]
struct ChildRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "type")]
    node_type: String,
    #[tabled(rename = "title")]
    title: String,
}

pub fn run(command: NodeCommand) -> Result<()> {
    let client = client()?;
    match command {
        NodeCommand::Get(args) => {
            let node = client
                .get_node(&args.site, &args.path)
                .with_context(|| format!("failed to read node {}", args.path))?;
            match node {
                Some(node) => print_json(&node)?,
                None => bail!("no node at {} in site '{}'", args.path, args.site),
            }
        }
        NodeCommand::Children(args) => {
            let children = client
                .get_children(&args.site, &args.path)
                .with_context(|| format!("failed to list children of {}", args.path))?;
            if args.json {
                print_json(&Value::Array(children))?;
            } else if children.is_empty() {
                println!("No children below {}.", args.path);
            } else {
                let rows: Vec<ChildRow> = children.iter().map(child_row).collect();
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{table}");
            }
        }
        NodeCommand::Remove(args) => {
            client
                .remove_node(&args.site, &args.path)
                .with_context(|| format!("failed to remove node {}", args.path))?;
            println!("✓ Removed {}", args.path);
        }
        NodeCommand::Rename(args) => {
            client
                .rename_node(&args.site, &args.source, &args.target)
                .with_context(|| format!("failed to move {} to {}", args.source, args.target))?;
            println!("✓ Moved {} to {}", args.source, args.target);
        }
    }
    Ok(())
}

fn child_row(node: &Value) -> ChildRow {
    let text = |key: &str| {
        node.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let title = node
        .pointer("/Fields/core.Title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    ChildRow {
        path: text("Path"),
        node_type: text("Type"),
        title,
    }
}
