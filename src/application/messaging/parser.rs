//! Message parser - Parses raw text into structured messages

use crate::domain::entities::{Content, Message, MessageType, User};

/// Parses incoming text into Message objects
pub struct MessageParser {
    command_prefix: String,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.command_prefix
    }

    /// Parse a text message
    pub fn parse(&self, chat_id: impl Into<String>, text: impl Into<String>, sender: Option<User>) -> Message {
        let text = text.into();
        let chat_id = chat_id.into();

        let message = match self.parse_command(&text) {
            Some(content) => Message::new(chat_id, content).with_message_type(MessageType::Command),
            None => Message::new(chat_id, Content::Text { text }).with_message_type(MessageType::Text),
        };
        message.with_sender_opt(sender)
    }

    /// Split `/name@bot arg1 arg2` into a command; None for plain text
    fn parse_command(&self, text: &str) -> Option<Content> {
        let cmd_text = text.strip_prefix(self.command_prefix.as_str())?;

        let mut parts = cmd_text.split_whitespace();
        let head = parts.next()?;
        // Drop the "@botname" suffix used in group chats
        let name = head.split('@').next().unwrap_or(head);
        if name.is_empty() {
            return None;
        }

        Some(Content::Command {
            name: name.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }

    /// Parse a callback query (inline button press)
    pub fn parse_callback(&self, chat_id: impl Into<String>, data: impl Into<String>, user: User) -> Message {
        Message::new(chat_id, Content::CallbackData { data: data.into() })
            .with_message_type(MessageType::Callback)
            .with_sender(user)
    }
}

impl Message {
    /// Helper to set sender as Option
    pub fn with_sender_opt(mut self, user: Option<User>) -> Self {
        if let Some(u) = user {
            self.sender = Some(u);
        }
        self
    }

    /// Helper for MessageType
    pub fn with_message_type(mut self, mt: MessageType) -> Self {
        self.message_type = mt;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_with_bot_suffix() {
        let parser = MessageParser::new("/");
        let msg = parser.parse("1", "/plugin@nocto_bot enable echo trace", None);

        assert_eq!(msg.message_type, MessageType::Command);
        assert_eq!(
            msg.content,
            Content::Command {
                name: "plugin".to_string(),
                args: vec!["enable".to_string(), "echo".to_string(), "trace".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_text() {
        let parser = MessageParser::new("!");
        let msg = parser.parse("1", "/not a command here", Some(User::new("5")));

        assert_eq!(msg.content.text(), Some("/not a command here"));
        assert_eq!(msg.sender_id(), Some("5"));
    }

    #[test]
    fn test_bare_prefix_is_text() {
        let parser = MessageParser::new("/");
        assert!(!parser.parse("1", "/", None).content.is_command());
    }
}
