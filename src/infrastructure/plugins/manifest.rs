//! Plugin package metadata (`plugin.yaml`)

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::application::errors::PluginError;

/// File name of the metadata file inside a plugin directory
pub const METADATA_FILE: &str = "plugin.yaml";

/// Plugin metadata
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PluginMetadata {
    pub name: Option<String>,

    pub version: Option<String>,

    pub description: Option<String>,

    pub author: Option<String>,

    /// Shared library to load, relative to the plugin directory
    pub library: Option<PathBuf>,

    /// Services that must provide a handle to this plugin; loading fails
    /// when any of them does not
    pub dependencies: Vec<String>,
}

impl PluginMetadata {
    /// Read metadata from `path`; a missing file is `Ok(None)`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Option<Self>, PluginError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PluginError::Io {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        serde_yaml::from_str(&content)
            .map(Some)
            .map_err(|e| PluginError::ConfigParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}
