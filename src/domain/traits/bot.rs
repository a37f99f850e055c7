use async_trait::async_trait;
use serde_json::{json, Value};

use crate::application::errors::BotError;

/// Bot API client - method-call interface of the messaging platform
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Invoke an API method with JSON parameters and return its result
    async fn call(&self, method: &str, params: Value) -> Result<Value, BotError>;

    /// Get bot info (also serves as the API handshake)
    async fn get_me(&self) -> Result<BotInfo, BotError> {
        let result = self.call("getMe", json!({})).await?;
        BotInfo::from_value(&result)
    }

    /// Send a text message to a chat
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<Value, BotError> {
        self.call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await
    }

    /// Send a message as a reply to another message
    async fn reply_to(&self, chat_id: &str, message_id: &str, text: &str) -> Result<Value, BotError> {
        self.call(
            "sendMessage",
            json!({ "chat_id": chat_id, "text": text, "reply_to_message_id": message_id }),
        )
        .await
    }
}

/// Bot information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotInfo {
    pub id: String,
    pub name: String,
    pub username: String,
}

impl BotInfo {
    pub fn from_value(value: &Value) -> Result<Self, BotError> {
        let id = match &value["id"] {
            Value::Number(id) => id.to_string(),
            Value::String(id) => id.clone(),
            _ => return Err(BotError::Parse("getMe result has no id".to_string())),
        };
        Ok(Self {
            id,
            name: value["first_name"].as_str().unwrap_or_default().to_string(),
            username: value["username"].as_str().unwrap_or_default().to_string(),
        })
    }
}

/// API client that accepts every call and does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullApi;

#[async_trait]
impl BotApi for NullApi {
    async fn call(&self, method: &str, _params: Value) -> Result<Value, BotError> {
        tracing::trace!("Dropping API call {}", method);
        match method {
            "getMe" => Ok(json!({ "id": 0, "first_name": "nocto", "username": "nocto" })),
            _ => Ok(Value::Bool(true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_info_from_value() {
        let info = BotInfo::from_value(&json!({
            "id": 42, "first_name": "Nocto", "username": "nocto_bot"
        }))
        .unwrap();
        assert_eq!(info.id, "42");
        assert_eq!(info.username, "nocto_bot");

        assert!(BotInfo::from_value(&json!({ "first_name": "x" })).is_err());
    }

    #[tokio::test]
    async fn test_null_api_handshake() {
        let info = NullApi.get_me().await.unwrap();
        assert_eq!(info.name, "nocto");
    }
}
