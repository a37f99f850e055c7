//! Telegram adapter

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::application::errors::BotError;
use crate::application::messaging::MessageParser;
use crate::domain::entities::{self, Message};
use crate::domain::traits::BotApi;

/// Telegram API base URL
const API_BASE: &str = "https://api.telegram.org";

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram update type
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<TgMessage>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub from: Option<TgUser>,
    pub chat: Chat,
    /// Unix time in seconds
    pub date: i64,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    pub message: Option<TgMessage>,
    pub data: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<Value>,
    description: Option<String>,
}

/// Bot API client for Telegram
pub struct TelegramApi {
    token: String,
    client: Client,
}

impl TelegramApi {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client: Client::new(),
        }
    }

    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.token, method)
    }

    /// Get updates from Telegram using getUpdates API
    pub async fn get_updates(&self, offset: i64, timeout: u64) -> Result<Vec<Update>, BotError> {
        #[derive(Serialize)]
        struct GetUpdatesRequest {
            offset: i64,
            timeout: u64,
            allowed_updates: Vec<String>,
        }

        let request = GetUpdatesRequest {
            offset,
            timeout,
            allowed_updates: vec!["message".to_string(), "callback_query".to_string()],
        };
        let params =
            serde_json::to_value(&request).map_err(|e| BotError::Parse(e.to_string()))?;
        let result = self.call("getUpdates", params).await?;

        serde_json::from_value(result).map_err(|e| BotError::Parse(e.to_string()))
    }

    /// Get the next update offset
    pub fn get_next_offset(updates: &[Update]) -> i64 {
        updates.iter().map(|u| u.update_id + 1).max().unwrap_or(0)
    }

    /// Long-poll for updates and forward them as messages until the receiver
    /// is dropped. Poll failures are logged and retried.
    pub async fn poll(&self, parser: MessageParser, timeout: u64, sender: mpsc::Sender<Message>) {
        let mut offset = 0;
        loop {
            let updates = match self.get_updates(offset, timeout).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!("Failed to poll updates: {}", e);
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            if !updates.is_empty() {
                offset = Self::get_next_offset(&updates);
            }
            for update in &updates {
                let Some(message) = convert_update(&parser, update) else {
                    tracing::trace!("Ignoring update {}", update.update_id);
                    continue;
                };
                if sender.send(message).await.is_err() {
                    tracing::debug!("Message receiver closed, stopping poll");
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl BotApi for TelegramApi {
    async fn call(&self, method: &str, params: Value) -> Result<Value, BotError> {
        tracing::debug!("Calling {}", method);

        let response = self
            .client
            .post(self.api_url(method))
            .json(&params)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        let status = response.status();
        let data: ApiResponse = response
            .json()
            .await
            .map_err(|e| BotError::Parse(e.to_string()))?;

        if !data.ok {
            return Err(BotError::Api(format!(
                "{} failed ({}): {}",
                method,
                status,
                data.description.unwrap_or_default()
            )));
        }
        Ok(data.result.unwrap_or(Value::Null))
    }
}

impl From<&TgUser> for entities::User {
    fn from(user: &TgUser) -> Self {
        let mut converted = entities::User::new(user.id.to_string());
        converted.is_bot = user.is_bot;
        if let Some(username) = &user.username {
            converted = converted.with_username(username);
        }
        if let Some(first_name) = &user.first_name {
            converted = converted.with_first_name(first_name);
        }
        converted
    }
}

/// Convert a Telegram update into a message; None for unsupported updates
pub fn convert_update(parser: &MessageParser, update: &Update) -> Option<Message> {
    if let Some(query) = &update.callback_query {
        let chat = query.message.as_ref()?.chat.id;
        let data = query.data.clone()?;
        return Some(
            parser
                .parse_callback(chat.to_string(), data, entities::User::from(&query.from))
                .with_id(query.id.clone())
                .with_platform("telegram")
                .with_private(chat >= 0),
        );
    }

    let message = update.message.as_ref()?;
    let text = message.text.clone()?;
    let timestamp = DateTime::<Utc>::from_timestamp(message.date, 0).unwrap_or_else(Utc::now);
    let raw = serde_json::to_value(message).unwrap_or(Value::Null);

    Some(
        parser
            .parse(
                message.chat.id.to_string(),
                text,
                message.from.as_ref().map(entities::User::from),
            )
            .with_id(message.message_id.to_string())
            .with_platform("telegram")
            .with_timestamp(timestamp)
            .with_private(message.chat.id >= 0)
            .with_raw(raw),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Content;
    use serde_json::json;

    fn update(value: Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_convert_command_update() {
        let parser = MessageParser::new("/");
        let update = update(json!({
            "update_id": 7,
            "message": {
                "message_id": 100,
                "from": { "id": 5, "is_bot": false, "username": "alice" },
                "chat": { "id": -42, "type": "group" },
                "date": 1700000000,
                "text": "/echo@nocto_bot hi there"
            }
        }));

        let message = convert_update(&parser, &update).unwrap();
        assert_eq!(message.id, "100");
        assert_eq!(message.chat_id, "-42");
        assert!(!message.private);
        assert_eq!(message.sender_id(), Some("5"));
        assert_eq!(
            message.content,
            Content::Command {
                name: "echo".into(),
                args: vec!["hi".into(), "there".into()]
            }
        );
        assert_eq!(message.timestamp.timestamp(), 1700000000);
    }

    #[test]
    fn test_private_chat_and_unsupported_updates() {
        let parser = MessageParser::new("/");
        let private = update(json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "chat": { "id": 5, "type": "private" },
                "date": 1700000000,
                "text": "hello"
            }
        }));
        assert!(convert_update(&parser, &private).unwrap().private);

        let sticker = update(json!({
            "update_id": 2,
            "message": { "message_id": 2, "chat": { "id": 5 }, "date": 1700000000 }
        }));
        assert!(convert_update(&parser, &sticker).is_none());
    }

    #[test]
    fn test_next_offset() {
        let updates = vec![
            update(json!({ "update_id": 3 })),
            update(json!({ "update_id": 9 })),
        ];
        assert_eq!(TelegramApi::get_next_offset(&updates), 10);
        assert_eq!(TelegramApi::get_next_offset(&[]), 0);
    }
}
