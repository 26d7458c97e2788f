//! Monsti core library: schema types, the node-type registry, the file-backed
//! node store and per-site configuration lookup.
//!
//! - [`types`]: node types, fields, mail and request descriptors
//! - [`registry`]: [`NodeTypeRegistry`] with field deduplication
//! - [`store`]: [`NodeStore`] over a site's node tree
//! - [`site_config`]: dotted-name lookups into module JSON files
//! - [`error`]: error enums for the above

pub mod error;
pub mod registry;
pub mod site_config;
pub mod store;
pub mod types;

pub use error::{RegistryError, SiteConfigError, StoreError};
pub use registry::NodeTypeRegistry;
pub use site_config::ConfigValue;
pub use store::NodeStore;
pub use types::{
    FieldConfig, FieldId, FieldType, LanguageMap, Mail, NodeType, NodeTypeId, Request,
};
