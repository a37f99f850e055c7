//! Plugin-local configuration (`config.yaml`)

use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;

use crate::application::errors::PluginError;
use crate::plugins::trait_def::ConfigResolver;

use super::manifest::{PluginMetadata, METADATA_FILE};

/// File name of the local config inside a plugin directory
pub const CONFIG_FILE: &str = "config.yaml";

/// Reads plugin config and metadata from the plugin directory
#[derive(Debug, Clone, Copy, Default)]
pub struct FsConfigResolver;

impl ConfigResolver for FsConfigResolver {
    fn read_local_config(&self, location: &Path) -> Result<Option<Value>, PluginError> {
        let path = location.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PluginError::Io {
                    path,
                    message: e.to_string(),
                })
            }
        };

        // JSON documents parse as YAML too
        let config: Value = serde_yaml::from_str(&content).map_err(|e| PluginError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        // An empty file means "no settings", not "no config"
        Ok(Some(match config {
            Value::Null => Value::Object(Default::default()),
            other => other,
        }))
    }

    fn read_metadata(&self, location: &Path) -> Result<Option<PluginMetadata>, PluginError> {
        PluginMetadata::from_file(location.join(METADATA_FILE))
    }

    fn merge_override(&self, config: &mut Value, overrides: &Value) {
        deep_merge(config, overrides);
    }
}

/// Merge `overrides` into `base`. Objects merge key by key, recursively; any
/// other override value replaces the base value.
pub fn deep_merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => *base = overrides.clone(),
    }
}
