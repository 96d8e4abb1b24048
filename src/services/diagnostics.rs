use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::database::Database;

/// One conversation as stored, with flags left raw so missing ones show up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationHealth {
    pub id: String,
    pub title: String,
    pub is_anonymous: Option<bool>,
    pub is_archived: Option<bool>,
    pub last_updated: DateTime<Utc>,
    pub message_count: usize,
}

impl ConversationHealth {
    pub fn is_listable(&self) -> bool {
        self.is_anonymous.is_some() && self.is_archived.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OwnerReport {
    pub owner_id: String,
    pub guest_active: usize,
    pub guest_archived: usize,
    pub account_active: usize,
    pub account_archived: usize,
    /// Records no filtered listing will return until repaired.
    pub missing_flags: usize,
    pub total_messages: usize,
    pub conversations: Vec<ConversationHealth>,
}

/// Summarise everything stored for one owner, including records that the
/// regular listings skip.
pub async fn inspect_owner(db: &Database, owner_id: &str) -> Result<OwnerReport> {
    let conversations = db.conversation_health(owner_id).await?;
    let mut report = OwnerReport {
        owner_id: owner_id.to_string(),
        ..Default::default()
    };

    for conv in &conversations {
        report.total_messages += conv.message_count;
        match (conv.is_anonymous, conv.is_archived) {
            (Some(true), Some(false)) => report.guest_active += 1,
            (Some(true), Some(true)) => report.guest_archived += 1,
            (Some(false), Some(false)) => report.account_active += 1,
            (Some(false), Some(true)) => report.account_archived += 1,
            _ => report.missing_flags += 1,
        }
    }

    if report.missing_flags > 0 {
        tracing::warn!(
            "{} conversation(s) for {} are missing flags and hidden from listings",
            report.missing_flags,
            owner_id
        );
    }

    report.conversations = conversations;
    Ok(report)
}

/// Give legacy records without an anonymous or archive flag the value
/// `false`, making them visible to listings again.
pub async fn repair_missing_flags(db: &Database) -> Result<usize> {
    let repaired = db.repair_missing_flags().await?;
    if repaired > 0 {
        tracing::info!("Repaired missing flags on {} conversation(s)", repaired);
    }
    Ok(repaired)
}

pub async fn find_orphaned_messages(db: &Database) -> Result<Vec<String>> {
    db.orphaned_message_ids().await
}

/// Remove messages left behind by an interrupted cascade-delete.
pub async fn purge_orphaned_messages(db: &Database) -> Result<usize> {
    let purged = db.purge_orphaned_messages().await?;
    if purged > 0 {
        tracing::info!("Purged {} orphaned message(s)", purged);
    }
    Ok(purged)
}
