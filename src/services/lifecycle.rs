use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::conversation::{
    cascade_delete, fallback_title, mirror_exchange, normalize_generated_title, store_now,
    CascadeResult,
};
use super::history::WorkingHistoryStore;
use super::store::ConversationStore;
use crate::config::CallTimeouts;
use crate::error::{LifecycleError, Result};
use crate::models::conversation::DEFAULT_TITLE;
use crate::models::{Conversation, ConversationQuery, Emotion, Message, Turn};
use crate::providers::{EmotionClassifier, ProviderError, ResponseGenerator, TitleGenerator};

/// Sent when the reply generator fails or times out.
pub const FALLBACK_REPLY: &str = "I'm here for you. Could you tell me more about what's on your \
mind? I really want to understand how you're feeling.";

/// The text-generation capabilities the manager calls out to.
#[derive(Clone)]
pub struct Capabilities {
    pub classifier: Arc<dyn EmotionClassifier>,
    pub generator: Arc<dyn ResponseGenerator>,
    pub titles: Arc<dyn TitleGenerator>,
}

impl Capabilities {
    /// All three capabilities served by one model.
    pub fn shared<M>(model: Arc<M>) -> Self
    where
        M: EmotionClassifier + ResponseGenerator + TitleGenerator + 'static,
    {
        Self {
            classifier: model.clone(),
            generator: model.clone(),
            titles: model,
        }
    }
}

/// What happened to the durable copy of an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    Mirrored,
    /// No store configured.
    MemoryOnly,
    /// The caller did not bind the exchange to a conversation.
    NoConversation,
    /// The bound conversation does not exist (or vanished mid-write).
    UnknownConversation,
    /// A store call failed; persistence for this exchange was lost.
    Failed(String),
}

impl MirrorOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, MirrorOutcome::Mirrored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub emotion: Emotion,
    pub reply: String,
    pub mirror: MirrorOutcome,
}

/// Totals from a guest teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub conversations_deleted: usize,
    pub messages_deleted: usize,
    /// Store calls that failed and were skipped; re-running picks them up.
    pub failures: usize,
}

async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}

/// Orchestrates turns, working history, durable mirroring and teardown.
///
/// Only [`LifecycleError::EmptyInput`] escapes `handle_turn`; every
/// collaborator failure is replaced by its fallback and logged.
pub struct ConversationLifecycleManager {
    history: Arc<WorkingHistoryStore>,
    store: Option<Arc<dyn ConversationStore>>,
    capabilities: Capabilities,
    timeouts: CallTimeouts,
}

impl ConversationLifecycleManager {
    pub fn new(
        history: Arc<WorkingHistoryStore>,
        store: Option<Arc<dyn ConversationStore>>,
        capabilities: Capabilities,
        timeouts: CallTimeouts,
    ) -> Self {
        if store.is_none() {
            tracing::warn!("No conversation store configured, running memory-only");
        }
        Self {
            history,
            store,
            capabilities,
            timeouts,
        }
    }

    pub fn history(&self) -> &WorkingHistoryStore {
        &self.history
    }

    pub fn is_durable(&self) -> bool {
        self.store.is_some()
    }

    // --- Turns ---

    pub async fn handle_turn(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        text: &str,
        is_guest: bool,
    ) -> Result<TurnReply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LifecycleError::EmptyInput);
        }

        let context = self.history.append(user_id, Turn::user(text));
        tracing::debug!(
            "Turn for user {} with {} turns of context",
            user_id,
            context.len()
        );

        let emotion = self.classify(text).await;
        let reply = self.generate(&context, emotion).await;

        let after = self
            .history
            .append(user_id, Turn::assistant(reply.clone(), emotion));
        tracing::debug!("Working history for user {} now {} turns", user_id, after.len());

        let mirror = self.mirror(conversation_id, text, &reply, emotion).await;
        if mirror.is_persisted() {
            if is_guest {
                tracing::info!("Guest exchange stored until logout for user {}", user_id);
            } else {
                tracing::info!("Exchange stored for user {}", user_id);
            }
        }

        Ok(TurnReply {
            emotion,
            reply,
            mirror,
        })
    }

    /// Persist an exchange the client already ran, without classification,
    /// generation or working-history changes.
    pub async fn save_only(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        text: &str,
        reply: &str,
        emotion: Emotion,
    ) -> TurnReply {
        let mirror = self.mirror(conversation_id, text, reply, emotion).await;
        if mirror.is_persisted() {
            tracing::info!("Saved pre-computed exchange for user {}", user_id);
        }
        TurnReply {
            emotion,
            reply: reply.to_string(),
            mirror,
        }
    }

    async fn classify(&self, text: &str) -> Emotion {
        match bounded(
            self.timeouts.classify,
            self.capabilities.classifier.classify(text),
        )
        .await
        {
            Ok(label) => {
                let emotion = Emotion::from_label(&label);
                if emotion == Emotion::Neutral && !label.to_lowercase().contains("neutral") {
                    tracing::warn!("Classifier returned unknown label {:?}, using neutral", label);
                }
                emotion
            }
            Err(e) => {
                tracing::warn!("Emotion classification failed, using neutral: {}", e);
                Emotion::Neutral
            }
        }
    }

    async fn generate(&self, context: &[Turn], emotion: Emotion) -> String {
        match bounded(
            self.timeouts.reply,
            self.capabilities.generator.reply(context, emotion),
        )
        .await
        {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Generator returned an empty reply, using fallback");
                FALLBACK_REPLY.to_string()
            }
            Err(e) => {
                tracing::warn!("Reply generation failed, using fallback: {}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }

    async fn mirror(
        &self,
        conversation_id: Option<&str>,
        user_text: &str,
        bot_text: &str,
        emotion: Emotion,
    ) -> MirrorOutcome {
        let Some(store) = &self.store else {
            return MirrorOutcome::MemoryOnly;
        };
        let Some(conversation_id) = conversation_id.filter(|id| !id.is_empty()) else {
            tracing::warn!("No conversation bound to exchange, not persisted");
            return MirrorOutcome::NoConversation;
        };

        match store.get_conversation(conversation_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!("Conversation {} not found, exchange not persisted", conversation_id);
                return MirrorOutcome::UnknownConversation;
            }
            Err(e) => {
                tracing::error!("Failed to look up conversation {}: {}", conversation_id, e);
                return MirrorOutcome::Failed(e.to_string());
            }
        }

        match mirror_exchange(store.as_ref(), conversation_id, user_text, bot_text, emotion).await {
            Ok(true) => MirrorOutcome::Mirrored,
            Ok(false) => {
                tracing::warn!(
                    "Conversation {} disappeared while its exchange was written",
                    conversation_id
                );
                MirrorOutcome::UnknownConversation
            }
            Err(e) => {
                tracing::error!("Failed to store exchange in {}: {}", conversation_id, e);
                MirrorOutcome::Failed(e.to_string())
            }
        }
    }

    // --- Teardown ---

    /// Forget the user's working history. Durable data is untouched.
    pub fn clear_working_history(&self, user_id: &str) {
        self.history.clear(user_id);
    }

    /// Clear working history and cascade-delete every anonymous conversation
    /// the user owns. Store failures are counted, not raised; calling again
    /// retries whatever is left.
    pub async fn clear_guest_data(&self, user_id: &str) -> CleanupReport {
        self.clear_working_history(user_id);

        let mut report = CleanupReport::default();
        let Some(store) = &self.store else {
            return report;
        };

        let conversations = match store
            .list_conversations(&ConversationQuery::guest_owned(user_id))
            .await
        {
            Ok(conversations) => conversations,
            Err(e) => {
                tracing::error!("Failed to list guest conversations for {}: {}", user_id, e);
                report.failures += 1;
                return report;
            }
        };

        for conversation in conversations {
            match cascade_delete(store.as_ref(), &conversation.id).await {
                Ok(result) => {
                    report.messages_deleted += result.messages_deleted;
                    if result.conversation_deleted {
                        report.conversations_deleted += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to delete guest conversation {}: {}",
                        conversation.id,
                        e
                    );
                    report.failures += 1;
                }
            }
        }

        tracing::info!(
            "Deleted {} guest conversation(s) for user {}",
            report.conversations_deleted,
            user_id
        );
        report
    }

    /// Account sessions keep their durable conversations.
    ///
    /// Clears only what has already landed: a turn still in flight for the
    /// user appends its assistant half afterwards, leaving a history that
    /// starts with that lone assistant turn.
    pub async fn logout(&self, user_id: &str, is_guest: bool) -> CleanupReport {
        if is_guest {
            self.clear_guest_data(user_id).await
        } else {
            self.clear_working_history(user_id);
            tracing::info!("Logged out user {}, conversations kept", user_id);
            CleanupReport::default()
        }
    }

    // --- Conversation metadata ---

    /// Create a conversation. Returns `None` in memory-only mode.
    ///
    /// A non-blank `smart_title_from` asks the title generator for a title,
    /// falling back to a prefix of the seed; otherwise `title`, otherwise
    /// "New Conversation".
    pub async fn create(
        &self,
        owner_id: &str,
        is_guest: bool,
        title: Option<&str>,
        smart_title_from: Option<&str>,
    ) -> Result<Option<Conversation>> {
        if owner_id.trim().is_empty() {
            return Err(LifecycleError::Validation("owner id is required".to_string()));
        }
        let Some(store) = &self.store else {
            return Ok(None);
        };

        let title = match smart_title_from.map(str::trim).filter(|s| !s.is_empty()) {
            Some(seed) => self.smart_title(seed).await,
            None => title
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
        };

        let now = store_now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            is_anonymous: is_guest,
            is_archived: false,
            title,
            last_message: String::new(),
            created_at: now,
            last_updated: now,
        };
        store.insert_conversation(&conversation).await?;

        tracing::info!(
            "Created conversation '{}' for {} {}",
            conversation.title,
            if is_guest { "guest" } else { "user" },
            owner_id
        );
        Ok(Some(conversation))
    }

    async fn smart_title(&self, seed: &str) -> String {
        match bounded(self.timeouts.title, self.capabilities.titles.title(seed)).await {
            Ok(raw) => normalize_generated_title(&raw).unwrap_or_else(|| {
                tracing::warn!("Title generator returned nothing usable");
                fallback_title(seed)
            }),
            Err(e) => {
                tracing::warn!("Title generation failed, using message prefix: {}", e);
                fallback_title(seed)
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        match &self.store {
            Some(store) => Ok(store.get_conversation(id).await?),
            None => Ok(None),
        }
    }

    pub async fn rename(&self, id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(LifecycleError::Validation("title is required".to_string()));
        }
        let Some(store) = &self.store else {
            return Ok(());
        };
        if !store.update_conversation_title(id, title).await? {
            return Err(LifecycleError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn archive(&self, id: &str, archived: bool) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if !store.set_conversation_archived(id, archived, store_now()).await? {
            return Err(LifecycleError::NotFound(id.to_string()));
        }
        tracing::info!(
            "Conversation {} {}",
            id,
            if archived { "archived" } else { "unarchived" }
        );
        Ok(())
    }

    /// Cascade-delete one conversation. An error leaves it partially deleted
    /// and the call can simply be repeated.
    pub async fn delete(&self, id: &str) -> Result<CascadeResult> {
        let Some(store) = &self.store else {
            return Ok(CascadeResult::default());
        };
        let result = cascade_delete(store.as_ref(), id).await?;
        tracing::info!(
            "Deleted conversation {} with {} message(s)",
            id,
            result.messages_deleted
        );
        Ok(result)
    }

    /// Conversations matching the exact (owner, guest, archived) triple,
    /// newest activity first. Store failures yield an empty list.
    pub async fn list(&self, owner_id: &str, is_guest: bool, is_archived: bool) -> Vec<Conversation> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        let query = ConversationQuery::exact(owner_id, is_guest, is_archived);
        match store.list_conversations(&query).await {
            Ok(conversations) => conversations,
            Err(e) => {
                tracing::error!("Failed to list conversations for {}: {}", owner_id, e);
                Vec::new()
            }
        }
    }

    pub async fn list_messages(&self, conversation_id: &str) -> Vec<Message> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.list_messages(conversation_id).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!("Failed to load messages for {}: {}", conversation_id, e);
                Vec::new()
            }
        }
    }
}
