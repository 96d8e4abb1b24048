use async_trait::async_trait;

use super::types::{ChatRequest, ChatResponse, ProviderError};
use crate::models::{Emotion, Turn};

/// A chat-completion backend.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Maps free text to a raw emotion label. The caller is responsible for
/// interpreting the label against the fixed set.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<String, ProviderError>;
}

/// Produces the assistant reply. `history` is ordered oldest first and already
/// ends with the user turn being answered.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn reply(&self, history: &[Turn], emotion: Emotion) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn title(&self, seed: &str) -> Result<String, ProviderError>;
}
