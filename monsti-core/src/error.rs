//! Error types for monsti-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::NodeTypeId;

/// Errors raised by the node-type registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A node type with this id was registered earlier.
    #[error("node type with id {0} does already exist")]
    DuplicateNodeType(NodeTypeId),

    #[error("unknown node type {0:?}")]
    UnknownNodeType(NodeTypeId),
}

/// Errors raised by the file-backed node store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure other than a missing node.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `node.json` exists but is not valid JSON.
    #[error("malformed node document at {path}: {source}")]
    MalformedNode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("node document at {path} is not a JSON object")]
    NotAnObject { path: PathBuf },

    /// Node path escapes the site root or is otherwise unusable.
    #[error("invalid node path {path:?}")]
    InvalidPath { path: String },
}

/// Errors raised while reading per-site module configuration.
#[derive(Debug, Error)]
pub enum SiteConfigError {
    #[error("could not read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
