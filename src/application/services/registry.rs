//! Service registry - shared capabilities and message filters

use std::sync::{Arc, PoisonError, RwLock};

use crate::application::errors::BotError;
use crate::domain::entities::{Message, MessageMeta};
use crate::plugins::trait_def::{ServiceConsumerContext, ServiceFactory, ServiceHandle};

/// Decision of a message filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    Reject,
}

/// Host-side service.
///
/// Every method has a pass-through default, so a service only implements the
/// parts it cares about.
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// Capability handed to a consumer that requests this service
    fn provides(&self, _consumer: &ServiceConsumerContext) -> Option<ServiceHandle> {
        None
    }

    /// Decide whether a message is passed on to handlers and plugins
    fn filter_message(&self, _message: &Message, _meta: &MessageMeta) -> Result<FilterVerdict, BotError> {
        Ok(FilterVerdict::Accept)
    }

    fn handle_message(&self, _message: &Message, _meta: &MessageMeta) -> Result<(), BotError> {
        Ok(())
    }
}

/// Registered services, in registration order
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<Vec<Arc<dyn Service>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service; a service with the same name is replaced in place
    pub fn register(&self, service: Arc<dyn Service>) {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        match services.iter().position(|s| s.name() == service.name()) {
            Some(index) => services[index] = service,
            None => {
                tracing::info!("Registered service {}", service.name());
                services.push(service);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.all().into_iter().find(|s| s.name() == name)
    }

    /// Snapshot of all services
    pub fn all(&self) -> Vec<Arc<dyn Service>> {
        self.services.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.all().iter().map(|s| s.name().to_string()).collect()
    }
}

impl ServiceFactory for ServiceRegistry {
    fn provide(&self, consumer: &ServiceConsumerContext, service: &str) -> Option<ServiceHandle> {
        let provided = self.get(service)?.provides(consumer);
        if provided.is_none() {
            tracing::debug!("Service {} provides nothing to {}", service, consumer.name);
        }
        provided
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter;

    impl Service for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn provides(&self, consumer: &ServiceConsumerContext) -> Option<ServiceHandle> {
            Some(Arc::new(format!("counter for {}", consumer.name)))
        }
    }

    struct Silent;

    impl Service for Silent {
        fn name(&self) -> &str {
            "silent"
        }
    }

    #[test]
    fn test_provide_bound_to_consumer() {
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(Counter));
        registry.register(Arc::new(Silent));

        let handle = registry
            .provide(&ServiceConsumerContext::plugin("echo"), "counter")
            .unwrap();
        assert_eq!(handle.downcast_ref::<String>().unwrap(), "counter for echo");

        assert!(registry.provide(&ServiceConsumerContext::plugin("echo"), "silent").is_none());
        assert!(registry.provide(&ServiceConsumerContext::plugin("echo"), "missing").is_none());
        assert_eq!(registry.names(), vec!["counter", "silent"]);
    }
}
