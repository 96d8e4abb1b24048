use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title used when neither a title nor a smart-title seed is supplied.
pub const DEFAULT_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub owner_id: String,
    /// Fixed at creation. Decides cascade-delete eligibility on guest logout,
    /// independent of the session that later touches the conversation.
    pub is_anonymous: bool,
    pub is_archived: bool,
    pub title: String,
    pub last_message: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Equality filter over conversations. `None` leaves a field unconstrained;
/// `Some` only matches records that carry the field with that exact value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationQuery {
    pub owner_id: String,
    pub is_anonymous: Option<bool>,
    pub is_archived: Option<bool>,
}

impl ConversationQuery {
    pub fn exact(owner_id: &str, is_anonymous: bool, is_archived: bool) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            is_anonymous: Some(is_anonymous),
            is_archived: Some(is_archived),
        }
    }

    /// Every guest-owned conversation regardless of archive state.
    pub fn guest_owned(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            is_anonymous: Some(true),
            is_archived: None,
        }
    }
}
