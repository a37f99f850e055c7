use serde::Serialize;
use std::fmt;

/// Sender of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub is_bot: bool,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: None,
            first_name: None,
            is_bot: false,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_first_name(mut self, first: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self
    }

    /// True if the user's id or `@username` appears in `list`
    pub fn is_listed_in(&self, list: &[String]) -> bool {
        list.iter().any(|entry| {
            entry == &self.id
                || self
                    .username
                    .as_deref()
                    .map(|username| entry.strip_prefix('@').unwrap_or(entry) == username)
                    .unwrap_or(false)
        })
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.username, &self.first_name) {
            (Some(username), _) => write!(f, "@{}", username),
            (None, Some(first)) => write!(f, "{}", first),
            (None, None) => write!(f, "#{}", self.id),
        }
    }
}
