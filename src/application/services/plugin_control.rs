//! Plugin control service - `/plugin` admin command
//!
//! `/plugin <load|unload|reload|enable|disable|reenable> [names...|all]` and
//! `/plugin list`. Each step reports success or failure per plugin; failure
//! details go to the log, not into the chat. Listing is open to everyone,
//! every other operation is admin only.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::application::errors::{BotError, PluginError};
use crate::application::services::registry::Service;
use crate::domain::entities::{Message, MessageMeta};
use crate::domain::traits::BotApi;
use crate::plugins::{Outcomes, PluginManager};

static COMMAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^plugins?$").expect("valid regex"));

const YES: &str = "✔";
const NO: &str = "✘";

/// Administrative plugin operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOperation {
    Load,
    Unload,
    Reload,
    Enable,
    Disable,
    Reenable,
}

impl ControlOperation {
    fn disables(self) -> bool {
        matches!(
            self,
            Self::Reload | Self::Disable | Self::Reenable | Self::Unload
        )
    }

    fn unloads(self) -> bool {
        matches!(self, Self::Reload | Self::Unload)
    }

    fn loads(self) -> bool {
        matches!(self, Self::Reload | Self::Load | Self::Enable)
    }

    fn enables(self) -> bool {
        matches!(self, Self::Reload | Self::Enable | Self::Reenable)
    }

    /// `reload`/`reenable` without names apply to every plugin
    fn defaults_to_all(self) -> bool {
        matches!(self, Self::Reload | Self::Reenable)
    }
}

impl FromStr for ControlOperation {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "load" => Ok(Self::Load),
            "unload" => Ok(Self::Unload),
            "reload" => Ok(Self::Reload),
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            "reenable" => Ok(Self::Reenable),
            _ => Err(PluginError::IllegalOperation(s.to_string())),
        }
    }
}

impl fmt::Display for ControlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Unload => "unload",
            Self::Reload => "reload",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Reenable => "reenable",
        };
        f.write_str(name)
    }
}

/// Runs admin plugin operations against a plugin manager
#[derive(Clone)]
pub struct PluginControl {
    manager: Arc<PluginManager>,
    api: Arc<dyn BotApi>,
    admins: Vec<String>,
    auto_enabled: Vec<String>,
    /// Whether an admin wants each plugin enabled
    wanted: Arc<Mutex<HashMap<String, bool>>>,
}

impl PluginControl {
    pub fn new(
        manager: Arc<PluginManager>,
        api: Arc<dyn BotApi>,
        admins: Vec<String>,
        auto_enabled: Vec<String>,
    ) -> Self {
        let wanted = manager
            .get_names()
            .iter()
            .map(|name| (name.clone(), auto_enabled.contains(name)))
            .collect();
        Self {
            manager,
            api,
            admins,
            auto_enabled,
            wanted: Arc::new(Mutex::new(wanted)),
        }
    }

    /// Run one operation and return the report lines
    pub async fn perform(&self, operation: ControlOperation, requested: &[String]) -> Vec<String> {
        let mut reports = Vec::new();
        let mut names = self.select(operation, requested, &mut reports);

        if operation.disables() {
            let queue: Vec<String> = names
                .iter()
                .filter(|name| self.manager.is_loaded(name))
                .cloned()
                .collect();
            if !queue.is_empty() {
                let outcomes = self.manager.disable(Some(queue.as_slice())).await;
                reports.push(make_report("disable", &outcomes));
                retain_successful("disable", &mut names, &outcomes);
            }
        }

        if operation.unloads() && !names.is_empty() {
            let outcomes = self.manager.unload(Some(names.as_slice())).await;
            reports.push(make_report("unload", &outcomes));
            retain_successful("unload", &mut names, &outcomes);
        }

        if operation.loads() {
            let queue: Vec<String> = if operation == ControlOperation::Load {
                names.clone()
            } else {
                names
                    .iter()
                    .filter(|name| !self.manager.is_loaded(name))
                    .cloned()
                    .collect()
            };
            if !queue.is_empty() {
                let outcomes = self.manager.load(Some(queue.as_slice())).await;
                reports.push(make_report("load", &outcomes));
                retain_successful("load", &mut names, &outcomes);
            }
        }

        names.retain(|name| self.may_enable(name));
        if operation.enables() && !names.is_empty() {
            let outcomes = self.manager.enable(Some(names.as_slice())).await;
            reports.push(make_report("enable", &outcomes));
        }

        reports.retain(|report| !report.is_empty());
        reports
    }

    /// Resolve the requested names; unknown names are reported and dropped
    fn select(&self, operation: ControlOperation, requested: &[String], reports: &mut Vec<String>) -> Vec<String> {
        let all = requested.len() == 1 && requested[0].eq_ignore_ascii_case("all");
        if all || (requested.is_empty() && operation.defaults_to_all()) {
            return self.manager.get_names().to_vec();
        }

        let mut wanted = self.wanted.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = Vec::new();
        for name in requested.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let Some(record) = wanted.get_mut(name) else {
                reports.push(format!("Plugin \"{}\" not found", name));
                continue;
            };
            match operation {
                ControlOperation::Enable => *record = true,
                ControlOperation::Disable => *record = false,
                _ => {}
            }
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    fn may_enable(&self, name: &str) -> bool {
        self.auto_enabled.iter().any(|n| n == name)
            || self
                .wanted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(name)
                .copied()
                .unwrap_or(false)
    }

    /// `Ld/En/Name` listing of every registered plugin
    pub fn status(&self) -> String {
        let names = self.manager.get_names();
        if names.is_empty() {
            return "No plugins are registered with the bot.".to_string();
        }

        let rows: Vec<String> = names
            .iter()
            .map(|name| {
                format!(
                    "{}{} {}",
                    mark(self.manager.is_loaded(name)),
                    mark(self.manager.is_enabled(name)),
                    name
                )
            })
            .collect();
        format!("Ld/En/Name\n{}", rows.join("\n"))
    }

    /// Parse and run a `/plugin` command, returning the reply text
    pub async fn execute(&self, args: &[String]) -> String {
        let Some((keyword, names)) = args.split_first() else {
            return usage();
        };
        if is_listing(args) {
            return self.status();
        }

        match keyword.parse::<ControlOperation>() {
            Ok(operation) => {
                let reports = self.perform(operation, names).await;
                if reports.is_empty() {
                    "No operation performed".to_string()
                } else {
                    reports.join("\n")
                }
            }
            Err(e) => {
                tracing::debug!("{}", e);
                usage()
            }
        }
    }
}

impl Service for PluginControl {
    fn name(&self) -> &str {
        "pluginctl"
    }

    fn handle_message(&self, message: &Message, meta: &MessageMeta) -> Result<(), BotError> {
        let Some(command) = &meta.command else {
            return Ok(());
        };
        if !meta.fresh || !COMMAND.is_match(&command.name) {
            return Ok(());
        }

        let chat_id = message.chat_id.clone();
        let allowed = is_listing(&command.args)
            || message
                .sender
                .as_ref()
                .map(|sender| sender.is_listed_in(&self.admins))
                .unwrap_or(false);
        if !allowed {
            let api = self.api.clone();
            spawn(async move {
                let text = "Sorry, you are not authorized to perform this operation.";
                if let Err(e) = api.send_message(&chat_id, text).await {
                    tracing::warn!("Failed to send reply: {}", e);
                }
            })?;
            return Err(BotError::PermissionDenied(format!(
                "{} may not manage plugins",
                message.sender_id().unwrap_or("unknown sender")
            )));
        }

        let this = self.clone();
        let args = command.args.clone();
        spawn(async move {
            let reply = this.execute(&args).await;
            if let Err(e) = this.api.send_message(&chat_id, &reply).await {
                tracing::warn!("Failed to send plugin report: {}", e);
            }
        })
    }
}

fn spawn<F>(task: F) -> Result<(), BotError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| BotError::Internal(format!("No async runtime: {}", e)))?;
    handle.spawn(task);
    Ok(())
}

/// `list` and `status` are read-only and open to every user
fn is_listing(args: &[String]) -> bool {
    args.first()
        .map(|keyword| matches!(keyword.to_ascii_lowercase().as_str(), "list" | "status"))
        .unwrap_or(false)
}

fn usage() -> String {
    "Usage: /plugin <load|unload|reload|enable|disable|reenable> [names...|all]\n       /plugin list".to_string()
}

fn mark(value: bool) -> &'static str {
    if value {
        YES
    } else {
        NO
    }
}

/// One line per plugin; failures are logged with their details
fn make_report<T>(operation: &str, outcomes: &Outcomes<T>) -> String {
    let lines: Vec<String> = outcomes
        .iter()
        .map(|(name, result)| {
            let success = match result {
                Ok(_) => true,
                Err(e) if e.is_redundant_for(operation) => true,
                Err(e) => {
                    tracing::error!("Failed to {} {}: {}", operation, name, e);
                    false
                }
            };
            format!(
                "{} {} {}{}",
                mark(success),
                capitalize(operation),
                name,
                if success { "" } else { " (error details logged)" }
            )
        })
        .collect();
    lines.join("\n")
}

/// Drop names whose step failed; redundant load/unload results count as success
fn retain_successful<T>(operation: &str, names: &mut Vec<String>, outcomes: &Outcomes<T>) {
    names.retain(|name| match outcomes.get(name) {
        None | Some(Ok(_)) => true,
        Some(Err(e)) => e.is_redundant_for(operation),
    });
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
