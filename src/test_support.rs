//! Scripted collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::CallTimeouts;
use crate::models::{Conversation, ConversationQuery, Emotion, Message, Role, Turn};
use crate::providers::{EmotionClassifier, ProviderError, ResponseGenerator, TitleGenerator};
use crate::services::history::WorkingHistoryStore;
use crate::services::lifecycle::{Capabilities, ConversationLifecycleManager};
use crate::services::store::ConversationStore;
use crate::services::Database;

/// Answers with a fixed raw label.
pub struct FixedClassifier(pub &'static str);

#[async_trait]
impl EmotionClassifier for FixedClassifier {
    async fn classify(&self, _text: &str) -> Result<String, ProviderError> {
        Ok(self.0.to_string())
    }
}

/// Picks the first emotion word contained in the text.
pub struct KeywordClassifier;

#[async_trait]
impl EmotionClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<String, ProviderError> {
        let lower = text.to_lowercase();
        let label = Emotion::ALL
            .iter()
            .find(|e| lower.contains(e.as_str()))
            .copied()
            .unwrap_or_default();
        Ok(label.as_str().to_string())
    }
}

/// Replies "re: <last user turn>" and remembers each history it was given.
#[derive(Default)]
pub struct EchoGenerator {
    pub seen: Mutex<Vec<Vec<Turn>>>,
}

#[async_trait]
impl ResponseGenerator for EchoGenerator {
    async fn reply(&self, history: &[Turn], _emotion: Emotion) -> Result<String, ProviderError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(history.to_vec());
        }
        let last = history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or("");
        Ok(format!("re: {}", last))
    }
}

pub struct FixedTitle(pub &'static str);

#[async_trait]
impl TitleGenerator for FixedTitle {
    async fn title(&self, _seed: &str) -> Result<String, ProviderError> {
        Ok(self.0.to_string())
    }
}

/// Fails every capability call.
pub struct Broken;

#[async_trait]
impl EmotionClassifier for Broken {
    async fn classify(&self, _text: &str) -> Result<String, ProviderError> {
        Err(ProviderError::NetworkError("unreachable".to_string()))
    }
}

#[async_trait]
impl ResponseGenerator for Broken {
    async fn reply(&self, _history: &[Turn], _emotion: Emotion) -> Result<String, ProviderError> {
        Err(ProviderError::RateLimited {
            retry_after_secs: Some(30),
        })
    }
}

#[async_trait]
impl TitleGenerator for Broken {
    async fn title(&self, _seed: &str) -> Result<String, ProviderError> {
        Err(ProviderError::AuthError("bad key".to_string()))
    }
}

/// Never answers within any reasonable timeout.
pub struct Stalled;

#[async_trait]
impl EmotionClassifier for Stalled {
    async fn classify(&self, _text: &str) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("happy".to_string())
    }
}

#[async_trait]
impl ResponseGenerator for Stalled {
    async fn reply(&self, _history: &[Turn], _emotion: Emotion) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("too late".to_string())
    }
}

#[async_trait]
impl TitleGenerator for Stalled {
    async fn title(&self, _seed: &str) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("Too Late".to_string())
    }
}

/// A store whose every call errors.
pub struct UnavailableStore;

#[async_trait]
impl ConversationStore for UnavailableStore {
    async fn insert_conversation(&self, _conversation: &Conversation) -> Result<()> {
        bail!("store offline")
    }

    async fn get_conversation(&self, _id: &str) -> Result<Option<Conversation>> {
        bail!("store offline")
    }

    async fn list_conversations(&self, _query: &ConversationQuery) -> Result<Vec<Conversation>> {
        bail!("store offline")
    }

    async fn update_conversation_title(&self, _id: &str, _title: &str) -> Result<bool> {
        bail!("store offline")
    }

    async fn set_conversation_archived(
        &self,
        _id: &str,
        _archived: bool,
        _at: DateTime<Utc>,
    ) -> Result<bool> {
        bail!("store offline")
    }

    async fn touch_conversation(
        &self,
        _id: &str,
        _at: DateTime<Utc>,
        _last_message: &str,
    ) -> Result<bool> {
        bail!("store offline")
    }

    async fn delete_conversation(&self, _id: &str) -> Result<bool> {
        bail!("store offline")
    }

    async fn insert_message(&self, _message: &Message) -> Result<()> {
        bail!("store offline")
    }

    async fn list_messages(&self, _conversation_id: &str) -> Result<Vec<Message>> {
        bail!("store offline")
    }

    async fn delete_message(&self, _id: &str) -> Result<bool> {
        bail!("store offline")
    }
}

/// Wraps a database and fails the next `n` conversation deletes, leaving a
/// cascade with its messages gone but its parent still present.
pub struct FailingParentDelete {
    pub db: Database,
    remaining: AtomicUsize,
}

impl FailingParentDelete {
    pub fn new(db: Database, failures: usize) -> Self {
        Self {
            db,
            remaining: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl ConversationStore for FailingParentDelete {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.db.insert_conversation(conversation).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.db.get_conversation(id).await
    }

    async fn list_conversations(&self, query: &ConversationQuery) -> Result<Vec<Conversation>> {
        self.db.list_conversations(query).await
    }

    async fn update_conversation_title(&self, id: &str, title: &str) -> Result<bool> {
        self.db.update_conversation_title(id, title).await
    }

    async fn set_conversation_archived(
        &self,
        id: &str,
        archived: bool,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.db.set_conversation_archived(id, archived, at).await
    }

    async fn touch_conversation(
        &self,
        id: &str,
        at: DateTime<Utc>,
        last_message: &str,
    ) -> Result<bool> {
        self.db.touch_conversation(id, at, last_message).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            bail!("store offline")
        }
        self.db.delete_conversation(id).await
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        self.db.insert_message(message).await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.db.list_messages(conversation_id).await
    }

    async fn delete_message(&self, id: &str) -> Result<bool> {
        self.db.delete_message(id).await
    }
}

pub fn short_timeouts() -> CallTimeouts {
    CallTimeouts {
        classify: Duration::from_millis(50),
        reply: Duration::from_millis(50),
        title: Duration::from_millis(50),
    }
}

pub fn capabilities(
    classifier: impl EmotionClassifier + 'static,
    generator: Arc<dyn ResponseGenerator>,
    titles: impl TitleGenerator + 'static,
) -> Capabilities {
    Capabilities {
        classifier: Arc::new(classifier),
        generator,
        titles: Arc::new(titles),
    }
}

/// Manager over an in-memory database with well-behaved collaborators.
pub fn durable_manager(db: &Database) -> ConversationLifecycleManager {
    ConversationLifecycleManager::new(
        Arc::new(WorkingHistoryStore::default()),
        Some(Arc::new(db.clone())),
        capabilities(
            KeywordClassifier,
            Arc::new(EchoGenerator::default()),
            FixedTitle("Feeling Isolated Around Others"),
        ),
        short_timeouts(),
    )
}
