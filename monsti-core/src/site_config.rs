//! Per-site module configuration lookup.
//!
//! Each module keeps its settings for a site in `<config dir>/<module>.json`.
//! Values are addressed by a dotted name whose first segment selects the
//! module file and whose remaining segments walk into the JSON document, so
//! `core.mail.host` reads `core.json` and returns `.mail.host`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SiteConfigError;

/// A configuration lookup result. An unresolvable name yields `value: None`
/// rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigValue {
    #[serde(rename = "Value")]
    pub value: Option<Value>,
}

impl ConfigValue {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_absent(&self) -> bool {
        matches!(self.value, None | Some(Value::Null))
    }
}

/// Looks up `name` (`module.key.subkey`) below `config_dir`.
pub fn get_site_config(config_dir: &Path, name: &str) -> Result<ConfigValue, SiteConfigError> {
    let (module, rest) = name.split_once('.').unwrap_or((name, ""));
    get_config(&config_dir.join(format!("{module}.json")), rest)
}

/// Looks up the dotted `name` inside the JSON document at `path`.
///
/// A missing file, a missing key or a walk through a non-object all produce
/// an absent value. An empty segment ends the walk early.
pub fn get_config(path: &Path, name: &str) -> Result<ConfigValue, SiteConfigError> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ConfigValue::absent()),
        Err(source) => {
            return Err(SiteConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let document: Value =
        serde_json::from_slice(&content).map_err(|source| SiteConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut target = document;
    for segment in name.split('.') {
        if segment.is_empty() {
            break;
        }
        target = match target {
            Value::Object(mut map) => match map.remove(segment) {
                Some(value) => value,
                None => return Ok(ConfigValue::absent()),
            },
            _ => return Ok(ConfigValue::absent()),
        };
    }
    Ok(ConfigValue {
        value: Some(target),
    })
}
