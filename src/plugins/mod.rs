//! Plugin system for nocto
//!
//! The [`PluginManager`] owns every plugin's lifecycle: load, unload, enable,
//! disable and dispatch of named handlers. Plugin code is instantiated through
//! a [`ModuleLoader`](trait_def::ModuleLoader).

pub mod builtin;
pub mod events;
pub mod handlers;
pub mod manager;
pub mod outcome;
pub mod trait_def;
pub mod unit;

pub use events::PluginEvent;
pub use handlers::{PluginHandlers, HANDLE_MESSAGE};
pub use manager::{InvokeOptions, PluginManager, PluginManagerOptions};
pub use outcome::{Outcomes, StateChange};
pub use trait_def::{
    AppInfo, ConfigResolver, LoadContext, ModuleLoader, PluginResources, ServiceAccessor,
    ServiceConsumerContext, ServiceFactory, ServiceHandle,
};
pub use unit::{ModuleHandle, PluginUnit};
