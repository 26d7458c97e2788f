//! `monsti type` — registered node types and their fields.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use monsti_core::{FieldConfig, NodeType};

use super::client;

#[derive(Subcommand, Debug)]
pub enum TypeCommand {
    /// List registered node type ids.
    List,
    /// List every field definition shared by the registered node types.
    Fields,
    /// Show a node type with its resolved fields.
    Show(ShowArgs),
    /// List node types that may be added below a node of the given type.
    Addable(AddableArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Namespaced node type id, e.g. `core.Document`.
    pub id: String,

    /// Emit the node type as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AddableArgs {
    pub site: String,
    /// Node type of the parent node.
    pub node_type: String,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "field")]
    id: String,
    #[tabled(rename = "type")]
    field_type: String,
    #[tabled(rename = "required")]
    required: String,
    #[tabled(rename = "name")]
    name: String,
}

pub fn run(command: TypeCommand) -> Result<()> {
    let client = client()?;
    match command {
        TypeCommand::List => {
            let ids = client
                .list_node_types()
                .context("failed to list node types")?;
            for id in ids {
                println!("{id}");
            }
        }
        TypeCommand::Fields => {
            let fields = client.list_fields().context("failed to list fields")?;
            if fields.is_empty() {
                println!("No fields registered.");
            } else {
                print_fields(&fields);
            }
        }
        TypeCommand::Show(args) => {
            let node_type = client
                .get_node_type(&args.id)
                .with_context(|| format!("failed to look up node type '{}'", args.id))?;
            if args.json {
                super::print_json(
                    &serde_json::to_value(&node_type).context("failed to encode node type")?,
                )?;
            } else {
                print_node_type(&node_type);
            }
        }
        TypeCommand::Addable(args) => {
            let ids = client
                .get_addable_node_types(&args.site, &args.node_type)
                .with_context(|| format!("failed to list types addable to '{}'", args.node_type))?;
            if ids.is_empty() {
                println!("Nothing may be added below {}.", args.node_type);
            }
            for id in ids {
                println!("{id}");
            }
        }
    }
    Ok(())
}

fn print_node_type(node_type: &NodeType) {
    let label = display_name(&node_type.name).unwrap_or_default();
    let hidden = if node_type.hide {
        " (hidden)".bright_black().to_string()
    } else {
        String::new()
    };
    println!("{} {}{}", node_type.id.to_string().bold(), label, hidden);
    if !node_type.addable_to.is_empty() {
        println!("addable to: {}", node_type.addable_to.join(", "));
    }
    if node_type.fields.is_empty() {
        println!("No fields.");
        return;
    }

    print_fields(&node_type.fields);
}

fn print_fields(fields: &[FieldConfig]) {
    let rows: Vec<FieldRow> = fields.iter().map(field_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn field_row(field: &FieldConfig) -> FieldRow {
    FieldRow {
        id: field.id.to_string(),
        field_type: serde_json::to_value(&field.r#type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default(),
        required: if field.required { "yes" } else { "" }.to_string(),
        name: display_name(&field.name).unwrap_or_default(),
    }
}

/// English name if present, otherwise any translation.
fn display_name(names: &monsti_core::LanguageMap) -> Option<String> {
    names
        .get("en")
        .or_else(|| names.values().next())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use monsti_core::FieldType;

    #[test]
    fn field_row_uses_wire_type_names() {
        let field = FieldConfig {
            id: "core.Body".into(),
            required: true,
            name: [("de".to_string(), "Inhalt".to_string())].into(),
            r#type: FieldType::Html,
        };
        let row = field_row(&field);
        assert_eq!(row.field_type, "HTML");
        assert_eq!(row.required, "yes");
        assert_eq!(row.name, "Inhalt");
    }
}
