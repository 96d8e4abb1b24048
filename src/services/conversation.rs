use anyhow::Result;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use uuid::Uuid;

use super::store::ConversationStore;
use crate::models::{Emotion, Message, Sender};

/// Longest stored preview / fallback title, in characters.
pub const PREVIEW_CHARS: usize = 50;
pub const MAX_TITLE_CHARS: usize = 60;

/// First `n` characters of `text`, cut on a char boundary.
pub fn first_n_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Title derived from the seed text when no generated title is available.
pub fn fallback_title(seed: &str) -> String {
    let seed = seed.trim();
    if seed.chars().count() > PREVIEW_CHARS {
        format!("{}...", first_n_chars(seed, PREVIEW_CHARS))
    } else {
        seed.to_string()
    }
}

/// Clean a generated title: strip quotes and trailing punctuation, capitalise
/// the first letter and cap the length. `None` when nothing usable remains.
pub fn normalize_generated_title(raw: &str) -> Option<String> {
    let first_line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let trimmed = first_line
        .trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ',' | ';' | ':'))
        .trim();
    let trimmed = trimmed.strip_prefix("Title:").map(str::trim).unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }

    let mut chars = trimmed.chars();
    let mut title: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => return None,
    };

    if title.chars().count() > MAX_TITLE_CHARS {
        title = format!("{}...", first_n_chars(&title, MAX_TITLE_CHARS - 3));
    }
    Some(title)
}

/// Current time at the precision the store keeps.
pub fn store_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A store timestamp strictly after `prev`, sampled from the clock.
pub fn store_now_after(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = store_now();
    if now > prev {
        now
    } else {
        prev + Duration::microseconds(1)
    }
}

/// Write one exchange as two messages and refresh the conversation's
/// activity fields.
///
/// The steps run in order and are not atomic: a failure after the first write
/// leaves the conversation partially mirrored, which the next successful
/// exchange corrects. The bot message timestamp is always strictly later
/// than the user message timestamp.
pub async fn mirror_exchange(
    store: &dyn ConversationStore,
    conversation_id: &str,
    user_text: &str,
    bot_text: &str,
    emotion: Emotion,
) -> Result<bool> {
    let t0 = store_now();
    store
        .insert_message(&Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            text: user_text.to_string(),
            sender: Sender::User,
            emotion: None,
            timestamp: t0,
            order: Sender::User.order(),
        })
        .await?;

    let t1 = store_now_after(t0);
    store
        .insert_message(&Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            text: bot_text.to_string(),
            sender: Sender::Bot,
            emotion: Some(emotion),
            timestamp: t1,
            order: Sender::Bot.order(),
        })
        .await?;

    store
        .touch_conversation(
            conversation_id,
            t1,
            first_n_chars(user_text, PREVIEW_CHARS),
        )
        .await
}

/// Deletion totals for one cascade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeResult {
    pub messages_deleted: usize,
    pub conversation_deleted: bool,
}

/// Delete every message of a conversation, then the conversation itself.
///
/// Safe to re-run after a partial failure: a second pass finds fewer (or no)
/// children and still attempts the parent.
pub async fn cascade_delete(store: &dyn ConversationStore, conversation_id: &str) -> Result<CascadeResult> {
    let mut result = CascadeResult::default();
    for message in store.list_messages(conversation_id).await? {
        if store.delete_message(&message.id).await? {
            result.messages_deleted += 1;
        }
    }
    result.conversation_deleted = store.delete_conversation(conversation_id).await?;
    Ok(result)
}
