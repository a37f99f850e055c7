//! Module loaders - instantiate plugin code for the plugin manager

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use libloading::{Library, Symbol};

use crate::application::errors::{HookError, PluginError};
use crate::plugins::handlers::PluginHandlers;
use crate::plugins::trait_def::{LoadContext, ModuleLoader};
use crate::plugins::unit::ModuleHandle;

/// In-process plugin constructor
pub type PluginFactory = Arc<dyn Fn(&LoadContext) -> Result<PluginHandlers, HookError> + Send + Sync>;

/// Loads plugins compiled into the host.
///
/// Every `load` runs the factory again, so a reload always starts from fresh
/// plugin state and `invalidate` has nothing to drop.
#[derive(Default)]
pub struct StaticModuleLoader {
    factories: RwLock<HashMap<String, PluginFactory>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a plugin name
    pub fn with<F>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&LoadContext) -> Result<PluginHandlers, HookError> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&LoadContext) -> Result<PluginHandlers, HookError> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, context: LoadContext) -> Result<ModuleHandle, PluginError> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&context.name)
            .cloned()
            .ok_or_else(|| PluginError::load(&context.name, "no built-in plugin with this name"))?;

        let handlers = factory(&context).map_err(|e| PluginError::load(&context.name, e))?;
        Ok(ModuleHandle::new(handlers))
    }

    fn invalidate(&self, _location: &Path) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Entry point every shared-library plugin exports.
///
/// The signature passes Rust types across the library boundary, which have no
/// stable ABI. Plugins must be built against the same `nocto` version with the
/// same compiler release and profile as the host, and export the symbol as
/// `#[no_mangle] pub fn nocto_plugin_load(..)`.
pub type PluginEntryFn = fn(&LoadContext) -> Result<PluginHandlers, HookError>;

/// Symbol name of [`PluginEntryFn`]
pub const ENTRY_SYMBOL: &[u8] = b"nocto_plugin_load\0";

/// Loads plugins from shared libraries in their plugin directory.
///
/// Libraries are cached per plugin location. `invalidate` evicts the cache
/// entry; the library is unmapped once the last unit using it is dropped and
/// the next `load` maps the file afresh.
#[derive(Default)]
pub struct DynamicModuleLoader {
    libraries: Mutex<HashMap<PathBuf, Arc<Library>>>,
}

impl DynamicModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the library path: `library` from metadata, or `lib<name>.<ext>`
    pub fn library_path(context: &LoadContext) -> PathBuf {
        match context.metadata.as_ref().and_then(|m| m.library.as_ref()) {
            Some(library) => context.location.join(library),
            None => context.location.join(format!(
                "{}{}.{}",
                std::env::consts::DLL_PREFIX,
                context.name,
                std::env::consts::DLL_EXTENSION
            )),
        }
    }

    fn library(&self, context: &LoadContext) -> Result<Arc<Library>, PluginError> {
        let mut libraries = self.libraries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(library) = libraries.get(&context.location) {
            return Ok(library.clone());
        }

        let path = Self::library_path(context);
        if !path.exists() {
            return Err(PluginError::load(
                &context.name,
                format!("Library not found: {}", path.display()),
            ));
        }

        let library = unsafe {
            Library::new(&path)
                .map_err(|e| PluginError::load(&context.name, format!("Failed to load library: {}", e)))?
        };
        let library = Arc::new(library);
        libraries.insert(context.location.clone(), library.clone());
        Ok(library)
    }

    pub fn cached(&self) -> usize {
        self.libraries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl ModuleLoader for DynamicModuleLoader {
    fn load(&self, context: LoadContext) -> Result<ModuleHandle, PluginError> {
        let library = self.library(&context)?;

        let entry: PluginEntryFn = unsafe {
            let symbol: Symbol<PluginEntryFn> = library
                .get(ENTRY_SYMBOL)
                .map_err(|e| PluginError::load(&context.name, format!("Failed to find entry point: {}", e)))?;
            *symbol
        };

        let handlers = panic::catch_unwind(AssertUnwindSafe(|| entry(&context)))
            .map_err(|_| PluginError::load(&context.name, "entry point panicked"))?
            .map_err(|e| PluginError::load(&context.name, e))?;

        tracing::info!(
            "Loaded plugin library {}",
            Self::library_path(&context).display()
        );
        Ok(ModuleHandle::new(handlers).retaining(library))
    }

    fn invalidate(&self, location: &Path) -> Result<(), PluginError> {
        self.libraries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(location);
        Ok(())
    }
}

/// Resolves built-in plugins first and falls back to shared libraries
pub struct HostModuleLoader {
    builtin: StaticModuleLoader,
    dynamic: DynamicModuleLoader,
}

impl HostModuleLoader {
    pub fn new(builtin: StaticModuleLoader) -> Self {
        Self {
            builtin,
            dynamic: DynamicModuleLoader::new(),
        }
    }
}

impl ModuleLoader for HostModuleLoader {
    fn load(&self, context: LoadContext) -> Result<ModuleHandle, PluginError> {
        if self.builtin.contains(&context.name) {
            self.builtin.load(context)
        } else {
            self.dynamic.load(context)
        }
    }

    fn invalidate(&self, location: &Path) -> Result<(), PluginError> {
        self.builtin.invalidate(location)?;
        self.dynamic.invalidate(location)
    }
}
