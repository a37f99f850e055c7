//! Application layer errors

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::plugins::unit::PluginUnit;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Lifecycle operation that changes the enabled state of a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Enable,
    Disable,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Enable => "enable",
            Operation::Disable => "disable",
        }
    }

    /// State a plugin ends up in once the operation succeeds
    pub fn target_enabled(&self) -> bool {
        matches!(self, Operation::Enable)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enable" => Ok(Operation::Enable),
            "disable" => Ok(Operation::Disable),
            other => Err(PluginError::IllegalOperation(other.to_string())),
        }
    }
}

/// Failure reported by a plugin's own hook or handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Plugin lifecycle errors
///
/// Every variant except `IllegalOperation` is scoped to a single plugin name
/// and never aborts sibling operations in the same batch.
#[derive(Error, Debug, Clone)]
pub enum PluginError {
    #[error("Plugin \"{0}\" is already loaded")]
    AlreadyLoaded(String),

    #[error("Plugin \"{0}\" is not loaded")]
    NotLoaded(String),

    #[error("Failed to parse {}: {message}", .path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("Failed to read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("Failed to load plugin \"{name}\": {message}")]
    Load { name: String, message: String },

    #[error("{operation}() call on plugin \"{}\" failed: {source}", .unit.name())]
    OperationFailed {
        operation: Operation,
        unit: Arc<PluginUnit>,
        #[source]
        source: HookError,
    },

    #[error("Illegal plugin operation: {0}")]
    IllegalOperation(String),
}

impl PluginError {
    pub fn load(name: impl Into<String>, message: impl fmt::Display) -> Self {
        PluginError::Load {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// "Already loaded" on load or "not loaded" on unload; the requested end
    /// state already holds.
    pub fn is_redundant_for(&self, operation: &str) -> bool {
        match self {
            PluginError::AlreadyLoaded(_) => operation == "load",
            PluginError::NotLoaded(_) => operation == "unload",
            _ => false,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
