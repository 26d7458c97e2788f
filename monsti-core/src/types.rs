//! Domain types shared by the daemon and its clients.
//!
//! Everything here is plain data: serializable with serde, cloneable, and
//! free of I/O. Wire field names follow the capitalised JSON convention used
//! by node documents on disk (`Id`, `Type`, `AddableTo`, ...).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Namespace-qualified identifier of a node type, e.g. `core.Document`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeTypeId(pub String);

impl NodeTypeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for NodeTypeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeTypeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Globally shared identifier of a field, e.g. `core.Title`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldId(pub String);

impl FieldId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for FieldId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FieldId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Display strings keyed by locale (`en`, `de`, ...).
pub type LanguageMap = BTreeMap<String, String>;

/// Builds a [`LanguageMap`] with the same text for every locale.
pub fn language_map(text: &str, locales: &[&str]) -> LanguageMap {
    locales
        .iter()
        .map(|locale| ((*locale).to_owned(), text.to_owned()))
        .collect()
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FieldType {
    #[default]
    Text,
    #[serde(rename = "HTML")]
    Html,
    /// Reference to a file stored elsewhere.
    FileRef,
    /// Binary payload stored as a sibling data file named by the field id.
    File,
    /// Path of another node.
    Ref,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Html => write!(f, "html"),
            FieldType::FileRef => write!(f, "file-ref"),
            FieldType::File => write!(f, "file"),
            FieldType::Ref => write!(f, "ref"),
        }
    }
}

/// A field definition. Owned by the registry, shared by every node type that
/// lists its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FieldConfig {
    pub id: FieldId,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub name: LanguageMap,
    #[serde(default)]
    pub r#type: FieldType,
}

impl FieldConfig {
    /// A bare reference to a field some other node type defines.
    pub fn reference(id: impl Into<FieldId>) -> Self {
        Self {
            id: id.into(),
            required: false,
            name: LanguageMap::new(),
            r#type: FieldType::default(),
        }
    }
}

/// A node type as submitted for registration and as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeType {
    pub id: NodeTypeId,
    #[serde(default)]
    pub name: LanguageMap,
    #[serde(default)]
    pub hide: bool,
    /// Parent type patterns: `.` for anywhere, an exact type id, or a
    /// namespace prefix ending in `.`.
    #[serde(default)]
    pub addable_to: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl NodeType {
    pub fn field(&self, id: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.id.as_str() == id)
    }
}

// ---------------------------------------------------------------------------
// Mail
// ---------------------------------------------------------------------------

/// An outgoing mail message handed to the daemon's mail transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Mail {
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

impl Mail {
    /// Every envelope recipient, including blind copies.
    pub fn recipients(&self) -> Vec<&str> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(String::as_str)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// An in-flight HTTP-like request parked by the front end so handler
/// processes can look it up by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    #[serde(default)]
    pub id: u64,
    pub site: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub form: BTreeMap<String, Vec<String>>,
    pub received_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
