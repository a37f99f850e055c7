//! Lifecycle events emitted by the plugin manager

use std::sync::Arc;

use crate::application::errors::PluginError;
use crate::plugins::unit::PluginUnit;

/// Observable lifecycle events
#[derive(Debug, Clone)]
pub enum PluginEvent {
    Loaded(Arc<PluginUnit>),
    LoadFailed { name: String, error: PluginError },
    Unloaded(String),
    Enabled(Arc<PluginUnit>),
    EnableFailed { unit: Arc<PluginUnit>, error: PluginError },
    Disabled(Arc<PluginUnit>),
    DisableFailed { unit: Arc<PluginUnit>, error: PluginError },
}

impl PluginEvent {
    /// Event name as seen by observers
    pub fn kind(&self) -> &'static str {
        match self {
            PluginEvent::Loaded(_) => "pluginLoaded",
            PluginEvent::LoadFailed { .. } => "pluginLoadFailed",
            PluginEvent::Unloaded(_) => "pluginUnloaded",
            PluginEvent::Enabled(_) => "pluginEnabled",
            PluginEvent::EnableFailed { .. } => "pluginEnableFailed",
            PluginEvent::Disabled(_) => "pluginDisabled",
            PluginEvent::DisableFailed { .. } => "pluginDisableFailed",
        }
    }

    /// Name of the plugin the event refers to
    pub fn plugin_name(&self) -> &str {
        match self {
            PluginEvent::Loaded(unit)
            | PluginEvent::Enabled(unit)
            | PluginEvent::Disabled(unit)
            | PluginEvent::EnableFailed { unit, .. }
            | PluginEvent::DisableFailed { unit, .. } => unit.name(),
            PluginEvent::LoadFailed { name, .. } | PluginEvent::Unloaded(name) => name,
        }
    }

    pub fn error(&self) -> Option<&PluginError> {
        match self {
            PluginEvent::LoadFailed { error, .. }
            | PluginEvent::EnableFailed { error, .. }
            | PluginEvent::DisableFailed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub(crate) fn log(&self) {
        match self.error() {
            Some(error) => {
                tracing::warn!(plugin = %self.plugin_name(), event = self.kind(), "{}", error)
            }
            None => tracing::debug!(plugin = %self.plugin_name(), event = self.kind()),
        }
    }
}
