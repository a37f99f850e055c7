//! Plugin discovery - resolves the list of registered plugin names

use std::path::{Path, PathBuf};

use crate::application::errors::PluginError;

/// How the registered plugin list is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginDiscovery {
    /// Explicit registration list, in the given order
    Registered(Vec<String>),
    /// Every visible subdirectory of the base path
    Scan(PathBuf),
}

impl PluginDiscovery {
    pub fn resolve(&self) -> Result<Vec<String>, PluginError> {
        match self {
            PluginDiscovery::Registered(names) => Ok(names.clone()),
            PluginDiscovery::Scan(dir) => scan_plugin_dir(dir),
        }
    }
}

/// List plugin directories under `dir`, skipping hidden entries and files
pub fn scan_plugin_dir(dir: &Path) -> Result<Vec<String>, PluginError> {
    let io_error = |e: std::io::Error| PluginError::Io {
        path: dir.to_path_buf(),
        message: e.to_string(),
    };

    if !dir.exists() {
        tracing::warn!("Plugin directory does not exist: {}", dir.display());
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Failed to read directory entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        // Skip hidden directories
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    Ok(names)
}
