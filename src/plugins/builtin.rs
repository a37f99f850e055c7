//! Plugins compiled into the host

use serde_json::Value;

use crate::application::errors::HookError;
use crate::infrastructure::plugins::StaticModuleLoader;
use crate::plugins::handlers::{PluginHandlers, HANDLE_MESSAGE};
use crate::plugins::trait_def::LoadContext;

/// Loader preloaded with every built-in plugin
pub fn builtin_loader() -> StaticModuleLoader {
    StaticModuleLoader::new()
        .with("echo", echo)
        .with("trace", trace)
}

/// Logs every message it receives
fn trace(context: &LoadContext) -> Result<PluginHandlers, HookError> {
    let span = context.span.clone();
    Ok(PluginHandlers::new().on(HANDLE_MESSAGE, move |args| {
        let message = args.first().unwrap_or(&Value::Null);
        let meta = args.get(1).unwrap_or(&Value::Null);
        span.in_scope(|| tracing::info!("handle_message: meta = {}, message = {}", meta, message));
        Ok(())
    }))
}

/// Replies to `/echo <text>` with the text, reversed if `reverse: true`
fn echo(context: &LoadContext) -> Result<PluginHandlers, HookError> {
    let api = context.resources.api.clone();
    let reverse = context
        .config_value("reverse")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(PluginHandlers::new()
        .on_enable(|| async { Ok(()) })
        .on_disable(|| async { Ok(()) })
        .on(HANDLE_MESSAGE, move |args| {
            let (Some(message), Some(meta)) = (args.first(), args.get(1)) else {
                return Err(HookError::new("expected [message, meta]"));
            };
            let command = &meta["command"];
            if meta["fresh"] != Value::Bool(true) || !command.is_object() {
                return Ok(());
            }
            let is_echo = command["name"]
                .as_str()
                .map(|name| name.eq_ignore_ascii_case("echo"))
                .unwrap_or(false);
            if !is_echo {
                return Ok(());
            }

            let argument = command["argument"].as_str().unwrap_or_default();
            let text: String = if reverse {
                argument.chars().rev().collect()
            } else {
                argument.to_string()
            };
            let chat_id = message["chat_id"].as_str().unwrap_or_default().to_string();
            if text.is_empty() || chat_id.is_empty() {
                return Ok(());
            }

            let api = api.clone();
            let runtime = tokio::runtime::Handle::try_current().map_err(HookError::new)?;
            runtime.spawn(async move {
                if let Err(e) = api.send_message(&chat_id, &text).await {
                    tracing::trace!("[echo] Failed sending echoed message: {}", e);
                }
            });
            Ok(())
        }))
}
