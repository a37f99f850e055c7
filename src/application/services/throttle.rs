//! Throttle service - per-sender rate limit filter

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::application::errors::BotError;
use crate::application::services::registry::{FilterVerdict, Service};
use crate::domain::entities::{Message, MessageMeta};

/// Rejects messages from senders exceeding `max_requests` per window.
/// Listed users are exempt.
pub struct ThrottleService {
    requests: Mutex<HashMap<String, Vec<Instant>>>,
    max_requests: u32,
    window: Duration,
    exempt: Vec<String>,
}

impl ThrottleService {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            max_requests,
            window: Duration::from_secs(window_secs),
            exempt: Vec::new(),
        }
    }

    pub fn with_exempt(mut self, users: Vec<String>) -> Self {
        self.exempt = users;
        self
    }

    fn check_rate_limit(&self, key: &str, now: Instant) -> Result<bool, BotError> {
        let mut requests = self.requests.lock()
            .map_err(|_| BotError::Internal("Lock poisoned".to_string()))?;

        // Remove old requests outside the window
        requests.retain(|_, times| {
            times.retain(|&t| now.duration_since(t) < self.window);
            !times.is_empty()
        });

        let recent = requests.get(key).map_or(0, Vec::len);
        if recent >= self.max_requests as usize {
            return Ok(false);
        }

        requests.entry(key.to_string()).or_default().push(now);
        Ok(true)
    }

    /// Number of senders with requests inside the current window
    pub fn tracked(&self) -> usize {
        self.requests
            .lock()
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}

impl Service for ThrottleService {
    fn name(&self) -> &str {
        "throttle"
    }

    fn filter_message(&self, message: &Message, _meta: &MessageMeta) -> Result<FilterVerdict, BotError> {
        if let Some(sender) = &message.sender {
            if sender.is_listed_in(&self.exempt) {
                return Ok(FilterVerdict::Accept);
            }
        }

        // Rate limit by user or chat
        let key = message.sender_id().unwrap_or(&message.chat_id);
        if self.check_rate_limit(key, Instant::now())? {
            Ok(FilterVerdict::Accept)
        } else {
            tracing::debug!("Throttled message from {}", key);
            Ok(FilterVerdict::Reject)
        }
    }
}
