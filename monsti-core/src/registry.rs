//! In-memory node-type and field registry.
//!
//! Handler modules contribute node types at startup. Field definitions are
//! canonicalised by id: the first node type to mention a field id defines it,
//! and every later node type listing the same id refers to that definition
//! instead of carrying its own copy.
//!
//! The registry itself is not synchronised; the daemon keeps it behind a
//! read/write lock so that a registration is never observed half-applied.

use std::collections::BTreeMap;

use crate::error::RegistryError;
use crate::types::{FieldConfig, FieldId, LanguageMap, NodeType, NodeTypeId};

/// Separator between a node type's namespace and its local name.
pub const NAMESPACE_SEPARATOR: char = '.';

/// `AddableTo` entry meaning "addable under any parent".
pub const ADDABLE_ANYWHERE: &str = ".";

#[derive(Debug, Clone)]
struct RegisteredType {
    name: LanguageMap,
    hide: bool,
    addable_to: Vec<String>,
    fields: Vec<FieldId>,
}

#[derive(Debug, Default)]
pub struct NodeTypeRegistry {
    types: BTreeMap<NodeTypeId, RegisteredType>,
    fields: BTreeMap<FieldId, FieldConfig>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node_type`, canonicalising its fields.
    ///
    /// Fails with [`RegistryError::DuplicateNodeType`] without touching the
    /// registry if the id is already taken.
    pub fn register(&mut self, node_type: NodeType) -> Result<(), RegistryError> {
        if self.types.contains_key(&node_type.id) {
            return Err(RegistryError::DuplicateNodeType(node_type.id));
        }

        let mut field_ids = Vec::with_capacity(node_type.fields.len());
        for field in node_type.fields {
            match self.fields.get(&field.id) {
                Some(existing) => {
                    if *existing != field && !is_bare_reference(&field) {
                        tracing::debug!(
                            node_type = %node_type.id,
                            field = %field.id,
                            "field already registered; using existing definition",
                        );
                    }
                }
                None => {
                    self.fields.insert(field.id.clone(), field.clone());
                }
            }
            field_ids.push(field.id);
        }

        tracing::debug!(node_type = %node_type.id, fields = field_ids.len(), "registered node type");
        self.types.insert(
            node_type.id,
            RegisteredType {
                name: node_type.name,
                hide: node_type.hide,
                addable_to: node_type.addable_to,
                fields: field_ids,
            },
        );
        Ok(())
    }

    /// Returns the node type with its field references resolved.
    pub fn get(&self, id: &NodeTypeId) -> Result<NodeType, RegistryError> {
        let registered = self
            .types
            .get(id)
            .ok_or_else(|| RegistryError::UnknownNodeType(id.clone()))?;
        Ok(self.resolve(id, registered))
    }

    /// Ids of the visible node types that may be created below a node of
    /// type `parent`, sorted by id.
    pub fn addable_node_types(&self, parent: &str) -> Vec<NodeTypeId> {
        self.types
            .iter()
            .filter(|(_, t)| !t.hide)
            .filter(|(_, t)| t.addable_to.iter().any(|p| addable_to_matches(p, parent)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Registered node type ids, sorted.
    pub fn node_type_ids(&self) -> impl Iterator<Item = &NodeTypeId> {
        self.types.keys()
    }

    /// Canonical field definitions, sorted by field id. Each id appears once
    /// no matter how many node types list it.
    pub fn fields(&self) -> impl Iterator<Item = &FieldConfig> {
        self.fields.values()
    }

    fn resolve(&self, id: &NodeTypeId, registered: &RegisteredType) -> NodeType {
        NodeType {
            id: id.clone(),
            name: registered.name.clone(),
            hide: registered.hide,
            addable_to: registered.addable_to.clone(),
            fields: registered
                .fields
                .iter()
                .filter_map(|field_id| self.fields.get(field_id).cloned())
                .collect(),
        }
    }
}

/// Whether a single `AddableTo` pattern admits `parent`.
///
/// `.` admits every parent, an exact id admits itself, and a pattern ending in
/// `.` admits every type id it is a literal prefix of. `ns` does not admit
/// `nsx.Thing`; only `ns.` would admit `ns.Thing`.
pub fn addable_to_matches(pattern: &str, parent: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    pattern == ADDABLE_ANYWHERE
        || pattern == parent
        || (pattern.ends_with(NAMESPACE_SEPARATOR) && parent.starts_with(pattern))
}

fn is_bare_reference(field: &FieldConfig) -> bool {
    *field == FieldConfig::reference(field.id.clone())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{language_map, FieldType};

    fn title() -> FieldConfig {
        FieldConfig {
            id: FieldId::from("core.Title"),
            required: true,
            name: language_map("Title", &["en"]),
            r#type: FieldType::Text,
        }
    }

    fn node_type(id: &str, addable_to: &[&str], fields: Vec<FieldConfig>) -> NodeType {
        NodeType {
            id: NodeTypeId::from(id),
            name: language_map(id, &["en"]),
            hide: false,
            addable_to: addable_to.iter().map(|s| s.to_string()).collect(),
            fields,
        }
    }

    #[test]
    fn duplicate_registration_leaves_first_definition() {
        let mut registry = NodeTypeRegistry::new();
        registry
            .register(node_type("core.Document", &["."], vec![title()]))
            .expect("first");
        let err = registry
            .register(node_type("core.Document", &[], vec![]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateNodeType(_)));

        let kept = registry.get(&NodeTypeId::from("core.Document")).expect("get");
        assert_eq!(kept.addable_to, vec!["."]);
        assert_eq!(kept.fields.len(), 1);
    }

    #[test]
    fn later_types_share_the_first_field_definition() {
        let mut registry = NodeTypeRegistry::new();
        registry
            .register(node_type("core.Document", &["."], vec![title()]))
            .expect("document");
        let mut shadow = title();
        shadow.required = false;
        shadow.name = language_map("Other title", &["en"]);
        registry
            .register(node_type("core.File", &["."], vec![shadow]))
            .expect("file");

        let file = registry.get(&NodeTypeId::from("core.File")).expect("file");
        assert_eq!(file.fields[0], title());
    }

    #[test]
    fn bare_reference_resolves_to_canonical_field() {
        let mut registry = NodeTypeRegistry::new();
        registry
            .register(node_type("core.Document", &["."], vec![title()]))
            .expect("document");
        registry
            .register(node_type(
                "core.Image",
                &["."],
                vec![FieldConfig::reference("core.Title")],
            ))
            .expect("image");
        let image = registry.get(&NodeTypeId::from("core.Image")).expect("image");
        assert!(image.fields[0].required);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = NodeTypeRegistry::new();
        let err = registry.get(&NodeTypeId::from("core.Nope")).unwrap_err();
        assert!(err.to_string().contains("core.Nope"));
    }

    #[test]
    fn hidden_types_are_never_addable() {
        let mut registry = NodeTypeRegistry::new();
        let mut path = node_type("core.Path", &["."], vec![]);
        path.hide = true;
        registry.register(path).expect("path");
        assert!(registry.addable_node_types("").is_empty());
    }

    #[test]
    fn empty_pattern_matches_nothing() {
        assert!(!addable_to_matches("", ""));
        assert!(!addable_to_matches("", "core.Document"));
    }
}
