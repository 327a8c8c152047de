pub mod telegram;

use std::fmt;

use async_trait::async_trait;

/// A chat message extracted from a webhook update, reduced to what the
/// command router needs.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Platform-specific chat/channel ID
    pub chat_id: i64,
    /// Platform-specific user ID of the sender
    pub user_id: i64,
    /// Display name of the user
    pub user_name: String,
    /// The message text
    pub text: String,
}

/// Where an outbound message goes. Numeric IDs cover users, groups and
/// channels; anything else is treated as a `@username`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTarget {
    Id(i64),
    Username(String),
}

impl From<i64> for ChatTarget {
    fn from(id: i64) -> Self {
        ChatTarget::Id(id)
    }
}

impl From<&str> for ChatTarget {
    fn from(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(id) => ChatTarget::Id(id),
            Err(_) => ChatTarget::Username(raw.to_string()),
        }
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatTarget::Id(id) => write!(f, "{}", id),
            ChatTarget::Username(name) => write!(f, "{}", name),
        }
    }
}

/// Formatting applied by the messaging front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Markdown,
    Html,
}

/// Outbound chat notifications. Delivery is best-effort: implementations
/// log failures and never report them to the caller.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, target: ChatTarget, text: &str, format: TextFormat);
}
