use crate::{StoredEnum, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl StoredEnum for ChatRole {
    fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            _ => None,
        }
    }
}

/// One line of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
    pub created_at: Timestamp,
}

impl ChatTurn {
    pub fn user(text: &str, at: Timestamp) -> Self {
        Self {
            role: ChatRole::User,
            text: text.to_string(),
            created_at: at,
        }
    }

    pub fn assistant(text: &str, at: Timestamp) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.to_string(),
            created_at: at,
        }
    }
}

/// A stored fact about the user or about the character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub category: String,
    pub fact_key: String,
    pub fact_value: String,
    pub updated_at: Timestamp,
}
