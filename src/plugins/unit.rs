//! Plugin unit - the in-memory record of one loaded plugin

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::infrastructure::plugins::PluginMetadata;
use crate::plugins::handlers::PluginHandlers;

/// Instantiated plugin code as produced by a module loader
pub struct ModuleHandle {
    handlers: PluginHandlers,
    // Declared after `handlers` so the handlers drop first
    retain: Option<Arc<dyn Any + Send + Sync>>,
}

impl ModuleHandle {
    pub fn new(handlers: PluginHandlers) -> Self {
        Self {
            handlers,
            retain: None,
        }
    }

    /// Keep `owner` (e.g. a shared library) alive as long as the handlers
    pub fn retaining(mut self, owner: Arc<dyn Any + Send + Sync>) -> Self {
        self.retain = Some(owner);
        self
    }

    pub fn handlers(&self) -> &PluginHandlers {
        &self.handlers
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("handlers", &self.handlers)
            .field("retained", &self.retain.is_some())
            .finish()
    }
}

/// A loaded plugin.
///
/// A unit only exists while its plugin is loaded. `enabled` is flipped by the
/// manager as the last step of a successful transition (or, for disable, before
/// the hook runs).
pub struct PluginUnit {
    name: String,
    location: PathBuf,
    config: Option<Value>,
    metadata: Option<PluginMetadata>,
    module: ModuleHandle,
    enabled: AtomicBool,
    transition: Mutex<()>,
    span: tracing::Span,
}

impl PluginUnit {
    pub(crate) fn new(
        name: String,
        location: PathBuf,
        config: Option<Value>,
        metadata: Option<PluginMetadata>,
        module: ModuleHandle,
        span: tracing::Span,
    ) -> Self {
        Self {
            name,
            location,
            config,
            metadata,
            module,
            enabled: AtomicBool::new(false),
            transition: Mutex::new(()),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn config(&self) -> Option<&Value> {
        self.config.as_ref()
    }

    pub fn metadata(&self) -> Option<&PluginMetadata> {
        self.metadata.as_ref()
    }

    pub fn handlers(&self) -> &PluginHandlers {
        self.module.handlers()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Serialises enable/disable transitions of this unit
    pub(crate) fn transition_lock(&self) -> &Mutex<()> {
        &self.transition
    }
}

impl fmt::Debug for PluginUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginUnit")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("enabled", &self.is_enabled())
            .field("metadata", &self.metadata)
            .field("module", &self.module)
            .finish()
    }
}
