//! Message dispatcher - Routes inbound messages to services and plugins

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::application::errors::BotError;
use crate::application::services::{FilterVerdict, ServiceRegistry};
use crate::domain::entities::{Message, MessageMeta};
use crate::plugins::{InvokeOptions, PluginManager, HANDLE_MESSAGE};

/// What happened to a dispatched message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Passed every filter and reached handlers and plugins
    Delivered,
    /// Dropped by the named service filter
    Filtered(String),
    /// Private message while private chats are not allowed
    PrivateIgnored,
}

/// Message dispatcher - filters, then service handlers, then plugins
pub struct MessageDispatcher {
    services: Arc<ServiceRegistry>,
    plugins: Arc<PluginManager>,
    allow_private: bool,
    started_at: DateTime<Utc>,
}

impl MessageDispatcher {
    pub fn new(services: Arc<ServiceRegistry>, plugins: Arc<PluginManager>) -> Self {
        Self {
            services,
            plugins,
            allow_private: true,
            started_at: Utc::now(),
        }
    }

    pub fn with_allow_private(mut self, allow: bool) -> Self {
        self.allow_private = allow;
        self
    }

    /// Messages sent before this instant are backlog (not fresh)
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Process a message through the pipeline
    pub fn dispatch(&self, message: &Message) -> Result<Dispatch, BotError> {
        if message.private && !self.allow_private {
            return Ok(Dispatch::PrivateIgnored);
        }

        let meta = MessageMeta::for_message(message, self.started_at);
        let services = self.services.all();

        for service in &services {
            match service.filter_message(message, &meta) {
                Ok(FilterVerdict::Accept) => {}
                Ok(FilterVerdict::Reject) => {
                    return Ok(Dispatch::Filtered(service.name().to_string()));
                }
                Err(e) => {
                    tracing::error!(
                        "Service {} failed to filter message {}: {}",
                        service.name(),
                        message.id,
                        e
                    );
                    return Ok(Dispatch::Filtered(service.name().to_string()));
                }
            }
        }

        for service in &services {
            if let Err(e) = service.handle_message(message, &meta) {
                tracing::error!(
                    "Service {} failed to handle message {}: {}",
                    service.name(),
                    message.id,
                    e
                );
            }
        }

        let args = [to_value(message)?, to_value(&meta)?];
        self.plugins
            .invoke_handler(HANDLE_MESSAGE, InvokeOptions { require_enabled: true }, &args);
        Ok(Dispatch::Delivered)
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, BotError> {
    serde_json::to_value(value).map_err(|e| BotError::Parse(e.to_string()))
}
