//! Plugin infrastructure - loading plugin code and config from disk
//!
//! Each plugin lives in its own directory under the plugin base path and may
//! carry a `plugin.yaml` metadata file and a `config.yaml` local config.

pub mod config;
pub mod discovery;
pub mod loader;
pub mod manifest;

pub use config::{deep_merge, FsConfigResolver};
pub use discovery::PluginDiscovery;
pub use loader::{DynamicModuleLoader, HostModuleLoader, PluginFactory, StaticModuleLoader};
pub use manifest::PluginMetadata;
