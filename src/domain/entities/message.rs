use super::User;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Type of message content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Command,
    Callback,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Text => "text",
            MessageType::Command => "command",
            MessageType::Callback => "callback",
            MessageType::Other(s) => s,
        }
    }
}

/// Message content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
    Command { name: String, args: Vec<String> },
    CallbackData { data: String },
    Empty,
}

impl Content {
    pub fn text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self, Content::Command { .. })
    }
}

/// Represents an incoming message
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender: Option<User>,
    pub content: Content,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    pub platform: String,
    /// Sent in a one-to-one chat with the bot
    pub private: bool,
    pub raw: Option<serde_json::Value>,
}

impl Message {
    pub fn new(chat_id: impl Into<String>, content: Content) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            sender: None,
            content,
            message_type: MessageType::Text,
            timestamp: Utc::now(),
            platform: "unknown".to_string(),
            private: false,
            raw: None,
        }
    }

    pub fn from_text(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(chat_id, Content::Text { text: text.into() })
    }

    pub fn from_command(chat_id: impl Into<String>, name: impl Into<String>, args: Vec<String>) -> Self {
        let mut msg = Self::new(chat_id, Content::Command { name: name.into(), args });
        msg.message_type = MessageType::Command;
        msg
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sender(mut self, user: User) -> Self {
        self.sender = Some(user);
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.sender.as_ref().map(|u| u.id.as_str())
    }
}

/// Parsed bot command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandMeta {
    pub name: String,
    pub args: Vec<String>,
    /// Arguments as one string
    pub argument: String,
}

/// Data derived by the host for each inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageMeta {
    /// Sent after polling started (not backlog)
    pub fresh: bool,
    pub private: bool,
    pub command: Option<CommandMeta>,
}

impl MessageMeta {
    pub fn for_message(message: &Message, started_at: DateTime<Utc>) -> Self {
        let command = match &message.content {
            Content::Command { name, args } => Some(CommandMeta {
                name: name.clone(),
                args: args.clone(),
                argument: args.join(" "),
            }),
            _ => None,
        };

        Self {
            fresh: message.timestamp > started_at,
            private: message.private,
            command,
        }
    }
}
