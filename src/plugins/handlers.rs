//! Handler capability set exposed by a loaded plugin

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::application::errors::{HookError, Operation};

/// Name of the handler invoked for every accepted inbound message.
pub const HANDLE_MESSAGE: &str = "handle_message";

/// Asynchronous lifecycle hook; every call yields one single-resolution future
pub type LifecycleHook = Arc<dyn Fn() -> BoxFuture<'static, Result<(), HookError>> + Send + Sync>;

/// Synchronous named event handler
pub type EventHandler = Arc<dyn Fn(&[Value]) -> Result<(), HookError> + Send + Sync>;

/// The capabilities a plugin hands back to the manager when it is loaded.
///
/// Both lifecycle hooks are optional; a missing hook makes the matching
/// transition trivially successful.
#[derive(Clone, Default)]
pub struct PluginHandlers {
    enable: Option<LifecycleHook>,
    disable: Option<LifecycleHook>,
    handlers: HashMap<String, EventHandler>,
}

impl PluginHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_enable<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.enable = Some(Arc::new(move || Box::pin(hook())));
        self
    }

    pub fn on_disable<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.disable = Some(Arc::new(move || Box::pin(hook())));
        self
    }

    /// Register a named event handler, replacing any previous one
    pub fn on<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[Value]) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn hook(&self, operation: Operation) -> Option<&LifecycleHook> {
        match operation {
            Operation::Enable => self.enable.as_ref(),
            Operation::Disable => self.disable.as_ref(),
        }
    }

    pub fn handler(&self, name: &str) -> Option<&EventHandler> {
        self.handlers.get(name)
    }

    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl fmt::Debug for PluginHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handler_names().collect();
        names.sort_unstable();
        f.debug_struct("PluginHandlers")
            .field("enable", &self.enable.is_some())
            .field("disable", &self.disable.is_some())
            .field("handlers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_hooks_are_optional() {
        let handlers = PluginHandlers::new().on_enable(|| async { Ok(()) });

        assert!(handlers.hook(Operation::Enable).is_some());
        assert!(handlers.hook(Operation::Disable).is_none());

        let hook = handlers.hook(Operation::Enable).unwrap();
        assert!(hook().await.is_ok());
    }

    #[test]
    fn test_named_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handlers = PluginHandlers::new().on(HANDLE_MESSAGE, move |args| {
            counter.fetch_add(args.len(), Ordering::SeqCst);
            Ok(())
        });

        let handler = handlers.handler(HANDLE_MESSAGE).unwrap();
        handler(&[Value::Null, Value::Bool(true)]).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(handlers.handler("handle_callback").is_none());
    }
}
