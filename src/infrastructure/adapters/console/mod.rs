//! Console adapter for offline development

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::application::errors::BotError;
use crate::application::messaging::MessageParser;
use crate::domain::entities::{Message, User};
use crate::domain::traits::BotApi;

pub const CONSOLE_CHAT: &str = "console";

/// Bot API stand-in that prints outgoing messages to stdout
#[derive(Debug, Clone, Default)]
pub struct ConsoleApi;

impl ConsoleApi {
    pub fn new() -> Self {
        Self
    }

    /// Read stdin line by line and forward each line as a private message
    /// from the console user. Returns on EOF or when the receiver is dropped.
    pub async fn read_lines(&self, parser: MessageParser, sender: mpsc::Sender<Message>) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let user = User::new(CONSOLE_CHAT).with_username(CONSOLE_CHAT);

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read console input: {}", e);
                    break;
                }
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            let message = parser
                .parse(CONSOLE_CHAT, input, Some(user.clone()))
                .with_platform("console")
                .with_private(true);
            if sender.send(message).await.is_err() {
                return;
            }
        }
        tracing::info!("Console input closed");
    }
}

#[async_trait]
impl BotApi for ConsoleApi {
    async fn call(&self, method: &str, params: Value) -> Result<Value, BotError> {
        match method {
            "getMe" => Ok(json!({ "id": 0, "first_name": "nocto", "username": CONSOLE_CHAT })),
            "sendMessage" => {
                let text = params["text"].as_str().unwrap_or_default();
                println!("[BOT] {}", text);
                Ok(json!({ "message_id": 0, "text": text }))
            }
            _ => {
                tracing::debug!("Console ignores API method {}", method);
                Ok(Value::Bool(true))
            }
        }
    }
}
