//! Collaborator seams consumed by the plugin manager

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::application::errors::PluginError;
use crate::domain::traits::BotApi;
use crate::infrastructure::plugins::PluginMetadata;
use crate::plugins::unit::ModuleHandle;

/// Locates and instantiates plugin code.
pub trait ModuleLoader: Send + Sync {
    /// Instantiate the plugin described by `context` and return its handlers
    fn load(&self, context: LoadContext) -> Result<ModuleHandle, PluginError>;

    /// Drop any cached state for the code at `location` so the next `load`
    /// executes it afresh
    fn invalidate(&self, location: &Path) -> Result<(), PluginError>;
}

/// Reads plugin-local configuration and package metadata.
///
/// A missing file yields `Ok(None)`; a malformed one is an error.
pub trait ConfigResolver: Send + Sync {
    fn read_local_config(&self, location: &Path) -> Result<Option<Value>, PluginError>;

    fn read_metadata(&self, location: &Path) -> Result<Option<PluginMetadata>, PluginError>;

    /// Deep-merge `overrides` into `config`; the override wins per key
    fn merge_override(&self, config: &mut Value, overrides: &Value);
}

/// Opaque handle to a shared service capability
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

/// Hands out named cross-cutting services to their consumers.
pub trait ServiceFactory: Send + Sync {
    fn provide(&self, consumer: &ServiceConsumerContext, service: &str) -> Option<ServiceHandle>;
}

/// Factory that never provides anything
pub struct NoServices;

impl ServiceFactory for NoServices {
    fn provide(&self, _consumer: &ServiceConsumerContext, _service: &str) -> Option<ServiceHandle> {
        None
    }
}

/// Kind of component asking for a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerKind {
    Plugin,
    Service,
}

/// Identity of the component a service is handed to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceConsumerContext {
    pub kind: ConsumerKind,
    pub name: String,
}

impl ServiceConsumerContext {
    pub fn plugin(name: impl Into<String>) -> Self {
        Self {
            kind: ConsumerKind::Plugin,
            name: name.into(),
        }
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self {
            kind: ConsumerKind::Service,
            name: name.into(),
        }
    }
}

/// Service accessor bound to one consumer
#[derive(Clone)]
pub struct ServiceAccessor {
    consumer: ServiceConsumerContext,
    factory: Arc<dyn ServiceFactory>,
}

impl ServiceAccessor {
    pub fn new(consumer: ServiceConsumerContext, factory: Arc<dyn ServiceFactory>) -> Self {
        Self { consumer, factory }
    }

    pub fn consumer(&self) -> &ServiceConsumerContext {
        &self.consumer
    }

    pub fn request(&self, service: &str) -> Option<ServiceHandle> {
        self.factory.provide(&self.consumer, service)
    }

    /// Request a service and downcast it to its concrete type
    pub fn get<T: Any + Send + Sync>(&self, service: &str) -> Option<Arc<T>> {
        self.request(service)?.downcast::<T>().ok()
    }
}

impl fmt::Debug for ServiceAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccessor")
            .field("consumer", &self.consumer)
            .finish_non_exhaustive()
    }
}

/// Identity of the running host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub root: PathBuf,
}

impl AppInfo {
    pub fn identifier(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            root: PathBuf::from("."),
        }
    }
}

/// Resources shared by reference with every plugin
#[derive(Clone)]
pub struct PluginResources {
    pub api: Arc<dyn BotApi>,
    pub app: AppInfo,
}

impl PluginResources {
    pub fn new(api: Arc<dyn BotApi>, app: AppInfo) -> Self {
        Self { api, app }
    }
}

/// Everything a module loader hands to a plugin while instantiating it
#[derive(Clone)]
pub struct LoadContext {
    pub name: String,
    pub location: PathBuf,
    pub config: Option<Value>,
    pub metadata: Option<PluginMetadata>,
    pub resources: PluginResources,
    pub services: ServiceAccessor,
    /// Logging scope for this plugin
    pub span: tracing::Span,
}

impl LoadContext {
    /// Look up a top-level key of the merged plugin config
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.as_ref()?.get(key)
    }
}
