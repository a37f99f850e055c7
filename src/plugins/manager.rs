//! Plugin manager - handles plugin lifecycle and event dispatch
//!
//! Bulk operations take an optional list of plugin names (`None` means every
//! registered name) and resolve each name independently and concurrently. A
//! failure for one name never affects the others; callers get a per-name
//! [`Outcomes`] map back.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, info, Instrument};

use crate::application::errors::{HookError, Operation, PluginError};
use crate::infrastructure::plugins::FsConfigResolver;
use crate::plugins::events::PluginEvent;
use crate::plugins::outcome::{dedup_names, Outcomes, StateChange};
use crate::plugins::trait_def::{
    ConfigResolver, LoadContext, ModuleLoader, NoServices, PluginResources, ServiceAccessor,
    ServiceConsumerContext, ServiceFactory,
};
use crate::plugins::unit::PluginUnit;

const EVENT_CAPACITY: usize = 256;

/// Static settings of a plugin manager
#[derive(Debug, Clone, Default)]
pub struct PluginManagerOptions {
    /// Directory holding one subdirectory per plugin
    pub base_path: PathBuf,
    /// Registered plugin names, in dispatch order
    pub names: Vec<String>,
    /// Per-plugin config overrides, deep-merged over the local config
    pub overrides: HashMap<String, Value>,
}

/// Options for [`PluginManager::invoke_handler`]
#[derive(Debug, Clone, Copy)]
pub struct InvokeOptions {
    /// Skip plugins that are loaded but not enabled
    pub require_enabled: bool,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            require_enabled: true,
        }
    }
}

#[derive(Default)]
struct Registry {
    units: HashMap<String, Arc<PluginUnit>>,
    loading: HashSet<String>,
}

/// Owns the registry of plugin names and loaded units
pub struct PluginManager {
    names: Vec<String>,
    base_path: PathBuf,
    overrides: HashMap<String, Value>,
    registry: RwLock<Registry>,
    enable_queue: Mutex<Vec<String>>,
    loader: Arc<dyn ModuleLoader>,
    config: Arc<dyn ConfigResolver>,
    services: Arc<dyn ServiceFactory>,
    resources: PluginResources,
    events: broadcast::Sender<PluginEvent>,
}

impl PluginManager {
    /// Create a manager that reads plugin config from disk and provides no services
    pub fn new(
        options: PluginManagerOptions,
        loader: Arc<dyn ModuleLoader>,
        resources: PluginResources,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            names: dedup_names(&options.names),
            base_path: options.base_path,
            overrides: options.overrides,
            registry: RwLock::new(Registry::default()),
            enable_queue: Mutex::new(Vec::new()),
            loader,
            config: Arc::new(FsConfigResolver),
            services: Arc::new(NoServices),
            resources,
            events,
        }
    }

    pub fn with_config_resolver(mut self, config: Arc<dyn ConfigResolver>) -> Self {
        self.config = config;
        self
    }

    pub fn with_service_factory(mut self, services: Arc<dyn ServiceFactory>) -> Self {
        self.services = services;
        self
    }

    // -- queries --

    /// All registered plugin names, in registration order
    pub fn get_names(&self) -> &[String] {
        &self.names
    }

    /// Snapshot of the currently loaded units
    pub fn get_units(&self) -> HashMap<String, Arc<PluginUnit>> {
        self.read().units.clone()
    }

    pub fn unit(&self, name: &str) -> Option<Arc<PluginUnit>> {
        self.read().units.get(name).cloned()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.read().units.contains_key(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.unit(name).map(|unit| unit.is_enabled()).unwrap_or(false)
    }

    /// Registered names that are currently enabled
    pub fn enabled_names(&self) -> Vec<String> {
        self.names
            .iter()
            .filter(|name| self.is_enabled(name))
            .cloned()
            .collect()
    }

    pub fn get_enable_queue_size(&self) -> usize {
        self.queue().len()
    }

    /// Subscribe to lifecycle events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }

    // -- load / unload --

    /// Load the given plugins (default: all registered)
    pub async fn load(&self, names: Option<&[String]>) -> Outcomes<Arc<PluginUnit>> {
        let list = self.select(names);
        let results = join_all(list.into_iter().map(|name| async move {
            let result = self.load_one(&name).await;
            (name, result)
        }))
        .await;
        Outcomes::new(results)
    }

    async fn load_one(&self, name: &str) -> Result<Arc<PluginUnit>, PluginError> {
        let result = match self.reserve(name) {
            Ok(reservation) => {
                let job = self.instantiation(name);
                let result = tokio::task::spawn_blocking(move || job.run())
                    .await
                    .unwrap_or_else(|e| Err(PluginError::load(name, e)));
                if let Ok(unit) = &result {
                    self.write().units.insert(name.to_string(), unit.clone());
                }
                drop(reservation);
                result
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(unit) => self.emit(PluginEvent::Loaded(unit.clone())),
            Err(error) => self.emit(PluginEvent::LoadFailed {
                name: name.to_string(),
                error: error.clone(),
            }),
        }
        result
    }

    /// Mark `name` as being loaded; fails if it is loaded or already loading
    fn reserve(&self, name: &str) -> Result<LoadReservation<'_>, PluginError> {
        let mut registry = self.write();
        if registry.units.contains_key(name) || !registry.loading.insert(name.to_string()) {
            return Err(PluginError::AlreadyLoaded(name.to_string()));
        }
        Ok(LoadReservation {
            manager: self,
            name: name.to_string(),
        })
    }

    fn instantiation(&self, name: &str) -> Instantiation {
        Instantiation {
            name: name.to_string(),
            location: self.base_path.join(name),
            overrides: self.overrides.get(name).cloned(),
            loader: self.loader.clone(),
            config: self.config.clone(),
            resources: self.resources.clone(),
            services: ServiceAccessor::new(
                ServiceConsumerContext::plugin(name),
                self.services.clone(),
            ),
        }
    }

    /// Unload the given plugins (default: all registered).
    ///
    /// Does not call the plugins' disable hooks.
    pub async fn unload(&self, names: Option<&[String]>) -> Outcomes<()> {
        let list = self.select(names);
        let results = join_all(list.into_iter().map(|name| async move {
            let result = self.unload_one(&name);
            (name, result)
        }))
        .await;
        Outcomes::new(results)
    }

    fn unload_one(&self, name: &str) -> Result<(), PluginError> {
        let unit = self
            .write()
            .units
            .remove(name)
            .ok_or_else(|| PluginError::NotLoaded(name.to_string()))?;

        self.loader.invalidate(unit.location())?;
        self.emit(PluginEvent::Unloaded(name.to_string()));
        Ok(())
    }

    // -- enable / disable --

    pub async fn enable(&self, names: Option<&[String]>) -> Outcomes<StateChange> {
        self.change_state(Operation::Enable, names).await
    }

    pub async fn disable(&self, names: Option<&[String]>) -> Outcomes<StateChange> {
        self.change_state(Operation::Disable, names).await
    }

    /// Queue names for a later [`enable_queued`](Self::enable_queued)
    pub fn enable_later<S: AsRef<str>>(&self, names: &[S]) {
        let mut queue = self.queue();
        for name in names {
            let name = name.as_ref();
            if !queue.iter().any(|queued| queued == name) {
                queue.push(name.to_string());
            }
        }
    }

    /// Drain the enable queue and enable exactly the drained names
    pub async fn enable_queued(&self) -> Outcomes<StateChange> {
        let queued = std::mem::take(&mut *self.queue());
        self.enable(Some(queued.as_slice())).await
    }

    pub async fn change_state(
        &self,
        operation: Operation,
        names: Option<&[String]>,
    ) -> Outcomes<StateChange> {
        let list = self.select(names);
        let results = join_all(list.into_iter().map(|name| async move {
            let result = self.change_one(operation, &name).await;
            (name, result)
        }))
        .await;
        Outcomes::new(results)
    }

    async fn change_one(&self, operation: Operation, name: &str) -> Result<StateChange, PluginError> {
        let unit = self
            .unit(name)
            .ok_or_else(|| PluginError::NotLoaded(name.to_string()))?;

        let _transition = unit.transition_lock().lock().await;

        // Unloaded while waiting for a concurrent transition
        if !self.is_current(&unit) {
            return Err(PluginError::NotLoaded(name.to_string()));
        }
        if unit.is_enabled() == operation.target_enabled() {
            return Ok(StateChange::Unchanged(unit.clone()));
        }
        if operation == Operation::Disable {
            unit.set_enabled(false);
        }

        let result = match unit.handlers().hook(operation) {
            None => Ok(()),
            Some(hook) => AssertUnwindSafe(hook())
                .catch_unwind()
                .instrument(unit.span().clone())
                .await
                .unwrap_or_else(|panic| {
                    Err(HookError::new(format!("hook panicked: {}", panic_message(&*panic))))
                }),
        };

        match result {
            Ok(()) => {
                let event = match operation {
                    Operation::Enable => {
                        unit.set_enabled(true);
                        PluginEvent::Enabled(unit.clone())
                    }
                    Operation::Disable => PluginEvent::Disabled(unit.clone()),
                };
                self.emit(event);
                Ok(StateChange::Changed(unit.clone()))
            }
            Err(source) => {
                let error = PluginError::OperationFailed {
                    operation,
                    unit: unit.clone(),
                    source,
                };
                let event = match operation {
                    Operation::Enable => PluginEvent::EnableFailed {
                        unit: unit.clone(),
                        error: error.clone(),
                    },
                    Operation::Disable => PluginEvent::DisableFailed {
                        unit: unit.clone(),
                        error: error.clone(),
                    },
                };
                self.emit(event);
                Err(error)
            }
        }
    }

    fn is_current(&self, unit: &Arc<PluginUnit>) -> bool {
        self.read()
            .units
            .get(unit.name())
            .map(|current| Arc::ptr_eq(current, unit))
            .unwrap_or(false)
    }

    // -- dispatch --

    /// Call `handler_name` on every loaded (by default: enabled) plugin in
    /// registration order. Failures are logged and never propagated.
    pub fn invoke_handler(&self, handler_name: &str, options: InvokeOptions, args: &[Value]) {
        let units = self.get_units();
        for name in &self.names {
            let Some(unit) = units.get(name) else {
                continue;
            };
            if options.require_enabled && !unit.is_enabled() {
                continue;
            }
            let Some(handler) = unit.handlers().handler(handler_name) else {
                continue;
            };

            let _entered = unit.span().enter();
            match panic::catch_unwind(AssertUnwindSafe(|| handler(args))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Plugin {} failed to {}: {}", name, handler_name, e);
                }
                Err(panic) => {
                    error!(
                        "Plugin {} panicked in {}: {}",
                        name,
                        handler_name,
                        panic_message(&*panic)
                    );
                }
            }
        }
    }

    // -- internals --

    fn select(&self, names: Option<&[String]>) -> Vec<String> {
        match names {
            Some(names) => dedup_names(names),
            None => self.names.clone(),
        }
    }

    fn emit(&self, event: PluginEvent) {
        event.log();
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self) -> MutexGuard<'_, Vec<String>> {
        self.enable_queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases an in-flight load marker, including when the load future is dropped
struct LoadReservation<'a> {
    manager: &'a PluginManager,
    name: String,
}

impl Drop for LoadReservation<'_> {
    fn drop(&mut self) {
        self.manager.write().loading.remove(&self.name);
    }
}

/// Blocking part of a load: config, metadata and module instantiation
struct Instantiation {
    name: String,
    location: PathBuf,
    overrides: Option<Value>,
    loader: Arc<dyn ModuleLoader>,
    config: Arc<dyn ConfigResolver>,
    resources: PluginResources,
    services: ServiceAccessor,
}

impl Instantiation {
    fn run(self) -> Result<Arc<PluginUnit>, PluginError> {
        let span = tracing::info_span!("plugin", name = %self.name);
        let _entered = span.enter();

        let metadata = self.config.read_metadata(&self.location)?;
        if let Some(metadata) = &metadata {
            let missing: Vec<&str> = metadata
                .dependencies
                .iter()
                .map(String::as_str)
                .filter(|service| self.services.request(service).is_none())
                .collect();
            if !missing.is_empty() {
                return Err(PluginError::load(
                    &self.name,
                    format!("Required services unavailable: {}", missing.join(", ")),
                ));
            }
        }
        let mut config = self.config.read_local_config(&self.location)?;
        if let (Some(config), Some(overrides)) = (config.as_mut(), self.overrides.as_ref()) {
            self.config.merge_override(config, overrides);
        }

        let module = self.loader.load(LoadContext {
            name: self.name.clone(),
            location: self.location.clone(),
            config: config.clone(),
            metadata: metadata.clone(),
            resources: self.resources,
            services: self.services,
            span: span.clone(),
        })?;

        info!(
            "Instantiated plugin {} from {}",
            self.name,
            self.location.display()
        );
        Ok(Arc::new(PluginUnit::new(
            self.name,
            self.location,
            config,
            metadata,
            module,
            span.clone(),
        )))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
