use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved chat key for the life engine's synthetic conversation.
pub const LIFE_CHAT: &str = "__life__";

/// Opaque per-conversation key. All per-chat state is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The synthetic chat used by the life engine.
    pub fn life() -> Self {
        Self(LIFE_CHAT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_life(&self) -> bool {
        self.0 == LIFE_CHAT
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChatId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
