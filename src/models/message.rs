use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::emotion::Emotion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Sender::User),
            "bot" => Some(Sender::Bot),
            _ => None,
        }
    }

    /// Position of this half within an exchange.
    pub fn order(&self) -> i64 {
        match self {
            Sender::User => 0,
            Sender::Bot => 1,
        }
    }
}

/// Durable half of an exchange, stored under its conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub text: String,
    pub sender: Sender,
    pub emotion: Option<Emotion>,
    pub timestamp: DateTime<Utc>,
    pub order: i64,
}
