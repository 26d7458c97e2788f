//! Node types the daemon provides itself.

use monsti_core::types::{language_map, FieldConfig, FieldType, LanguageMap, NodeType};

use crate::error::DaemonError;
use crate::service::MonstiService;

pub const AVAILABLE_LOCALES: &[&str] = &["en", "de"];

fn name(text: &str) -> LanguageMap {
    language_map(text, AVAILABLE_LOCALES)
}

fn field(id: &str, text: &str, required: bool, r#type: FieldType) -> FieldConfig {
    FieldConfig {
        id: id.into(),
        required,
        name: name(text),
        r#type,
    }
}

fn node_type(id: &str, text: &str, hide: bool, fields: Vec<FieldConfig>) -> NodeType {
    NodeType {
        id: id.into(),
        name: name(text),
        hide,
        addable_to: if id == "core.Path" {
            vec![]
        } else {
            vec![".".to_string()]
        },
        fields,
    }
}

/// `core.Path`, `core.Document`, `core.File`, `core.Image` and
/// `core.ContactForm`, in registration order.
pub fn core_node_types() -> Vec<NodeType> {
    vec![
        node_type("core.Path", "Path", true, vec![]),
        node_type(
            "core.Document",
            "Document",
            false,
            vec![
                field("core.Title", "Title", true, FieldType::Text),
                field("core.Description", "Description", false, FieldType::Text),
                field("core.Thumbnail", "Thumbnail", false, FieldType::Ref),
                field("core.Body", "Body", true, FieldType::Html),
            ],
        ),
        node_type(
            "core.File",
            "File",
            false,
            vec![
                FieldConfig::reference("core.Title"),
                FieldConfig::reference("core.Description"),
                field("core.File", "File", true, FieldType::File),
            ],
        ),
        node_type(
            "core.Image",
            "Image",
            true,
            vec![
                FieldConfig::reference("core.Title"),
                FieldConfig::reference("core.File"),
            ],
        ),
        node_type(
            "core.ContactForm",
            "Contact form",
            false,
            vec![
                FieldConfig::reference("core.Title"),
                FieldConfig::reference("core.Description"),
                FieldConfig::reference("core.Body"),
            ],
        ),
    ]
}

pub async fn register_core_node_types(service: &MonstiService) -> Result<(), DaemonError> {
    for node_type in core_node_types() {
        service.register_node_type(node_type).await?;
    }
    Ok(())
}
