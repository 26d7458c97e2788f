//! File-tree backed node store.
//!
//! # Storage layout
//!
//! ```text
//! <site nodes root>/
//!   node.json               (the site root node)
//!   about/
//!     node.json             (node "/about")
//!     team/
//!       node.json           (node "/about/team")
//!       core.File           (data file of field core.File)
//!   archive/                (no node.json: a synthetic core.Path node)
//! ```
//!
//! Node paths always start with `/`. The `Path` attribute is never stored; it
//! is derived from the location and injected as the first key on read.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{io_err, StoreError};

/// Name of the node document inside a node directory.
pub const NODE_FILE: &str = "node.json";

/// Type given to directories that carry no `node.json`.
pub const PATH_NODE_TYPE: &str = "core.Path";

/// Attribute injected into every node document read from disk.
pub const PATH_ATTRIBUTE: &str = "Path";

pub const TYPE_ATTRIBUTE: &str = "Type";

/// The node tree of one site.
#[derive(Debug, Clone)]
pub struct NodeStore {
    root: PathBuf,
}

impl NodeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem directory of the node at `path`.
    pub fn node_dir(&self, path: &str) -> Result<PathBuf, StoreError> {
        let mut dir = self.root.clone();
        for component in path_components(path)? {
            dir.push(component);
        }
        Ok(dir)
    }

    /// Reads the node at `path`. `Ok(None)` means there is no `node.json`.
    pub fn get_node(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let file = self.node_dir(path)?.join(NODE_FILE);
        let raw = match fs::read(&file) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&file, err)),
        };
        let document: Value = serde_json::from_slice(&raw).map_err(|source| {
            StoreError::MalformedNode {
                path: file.clone(),
                source,
            }
        })?;
        let Value::Object(fields) = document else {
            return Err(StoreError::NotAnObject { path: file });
        };
        Ok(Some(with_path(&normalize(path)?, fields)))
    }

    /// Lists the children of `path`, sorted by name.
    ///
    /// Sub-directories without a `node.json` appear as `core.Path` nodes;
    /// plain files are skipped. Any read failure aborts the whole listing.
    pub fn get_children(&self, path: &str) -> Result<Vec<Value>, StoreError> {
        let parent = normalize(path)?;
        let dir = self.node_dir(path)?;
        let mut entries = fs::read_dir(&dir)
            .map_err(|e| io_err(&dir, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| io_err(&dir, e))?;
        entries.sort_by_key(|e| e.file_name());

        let mut children = Vec::new();
        for entry in entries {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                tracing::debug!(path = %entry.path().display(), "skipping non UTF-8 entry");
                continue;
            };
            let child = join_node_path(&parent, &name);
            match self.get_node(&child)? {
                Some(node) => children.push(node),
                None => children.push(placeholder(&child)),
            }
        }
        Ok(children)
    }

    /// Reads a data file of the node. `Ok(None)` if it does not exist.
    pub fn get_node_data(&self, path: &str, file: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let target = self.node_dir(path)?.join(data_file_name(file)?);
        match fs::read(&target) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(&target, err)),
        }
    }

    /// Writes a data file of the node, creating the node directory and any
    /// missing ancestors first.
    ///
    /// Write flow: create dirs → `<file>.tmp` sibling → `chmod 0600` → `rename`.
    pub fn write_node_data(&self, path: &str, file: &str, content: &[u8]) -> Result<(), StoreError> {
        let dir = self.node_dir(path)?;
        let name = data_file_name(file)?;
        create_dirs(&dir)?;

        let target = dir.join(name);
        let tmp = dir.join(format!("{name}.tmp"));
        fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        fs::rename(&tmp, &target).map_err(|e| io_err(&target, e))?;
        Ok(())
    }

    /// Serialises `node` into the node's `node.json`. An injected `Path`
    /// attribute is not persisted.
    pub fn write_node(&self, path: &str, node: &Value) -> Result<(), StoreError> {
        let file = self.node_dir(path)?.join(NODE_FILE);
        let Value::Object(fields) = node else {
            return Err(StoreError::NotAnObject { path: file });
        };
        let mut stored = fields.clone();
        stored.shift_remove(PATH_ATTRIBUTE);
        let content = serde_json::to_vec_pretty(&Value::Object(stored))
            .map_err(|source| StoreError::MalformedNode { path: file, source })?;
        self.write_node_data(path, NODE_FILE, &content)
    }

    /// Recursively deletes the node and everything below it. Removing a node
    /// that does not exist succeeds.
    pub fn remove_node(&self, path: &str) -> Result<(), StoreError> {
        let dir = self.non_root_dir(path)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&dir, err)),
        }
    }

    /// Moves the node directory at `source` to `target`, creating the
    /// target's parent first. Whether an occupied target is replaced is left
    /// to the platform's rename.
    pub fn rename_node(&self, source: &str, target: &str) -> Result<(), StoreError> {
        let from = self.non_root_dir(source)?;
        let to = self.non_root_dir(target)?;
        if let Some(parent) = to.parent() {
            create_dirs(parent)?;
        }
        fs::rename(&from, &to).map_err(|e| io_err(&from, e))
    }

    fn non_root_dir(&self, path: &str) -> Result<PathBuf, StoreError> {
        if path_components(path)?.is_empty() {
            return Err(StoreError::InvalidPath {
                path: path.to_owned(),
            });
        }
        self.node_dir(path)
    }
}

/// Joins a child name onto a normalised node path.
pub fn join_node_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn path_components(path: &str) -> Result<Vec<&str>, StoreError> {
    let components: Vec<&str> = path
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    if components.iter().any(|c| *c == "..") {
        return Err(StoreError::InvalidPath {
            path: path.to_owned(),
        });
    }
    Ok(components)
}

fn normalize(path: &str) -> Result<String, StoreError> {
    Ok(format!("/{}", path_components(path)?.join("/")))
}

fn data_file_name(file: &str) -> Result<&str, StoreError> {
    if file.is_empty() || file == "." || file == ".." || file.contains('/') {
        return Err(StoreError::InvalidPath {
            path: file.to_owned(),
        });
    }
    Ok(file)
}

fn with_path(path: &str, fields: Map<String, Value>) -> Value {
    let mut node = Map::with_capacity(fields.len() + 1);
    node.insert(PATH_ATTRIBUTE.to_owned(), Value::String(path.to_owned()));
    for (key, value) in fields {
        if key != PATH_ATTRIBUTE {
            node.insert(key, value);
        }
    }
    Value::Object(node)
}

fn placeholder(path: &str) -> Value {
    let mut node = Map::new();
    node.insert(PATH_ATTRIBUTE.to_owned(), Value::String(path.to_owned()));
    node.insert(
        TYPE_ATTRIBUTE.to_owned(),
        Value::String(PATH_NODE_TYPE.to_owned()),
    );
    Value::Object(node)
}

#[cfg(unix)]
fn create_dirs(dir: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|e| io_err(dir, e))
}
#[cfg(not(unix))]
fn create_dirs(dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
