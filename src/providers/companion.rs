use std::sync::Arc;

use async_trait::async_trait;

use super::prompts::{companion_prompt, CLASSIFIER_PROMPT, TITLE_PROMPT};
use super::traits::{AiProvider, EmotionClassifier, ResponseGenerator, TitleGenerator};
use super::types::{ChatMessage, ChatRequest, ProviderError};
use crate::models::{Emotion, Role, Turn};

/// The three text-generation capabilities, all backed by one chat model.
pub struct CompanionModel {
    provider: Arc<dyn AiProvider>,
    model: String,
}

impl CompanionModel {
    pub fn new(provider: Arc<dyn AiProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    fn request(
        &self,
        system_prompt: String,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            system_prompt: Some(system_prompt),
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
        }
    }

    fn single(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: Role::User,
            content: text.to_string(),
        }]
    }
}

/// Convert working history into provider chat messages, oldest first.
pub fn turns_to_chat_messages(turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|t| ChatMessage {
            role: t.role,
            content: t.content.clone(),
        })
        .collect()
}

#[async_trait]
impl EmotionClassifier for CompanionModel {
    async fn classify(&self, text: &str) -> Result<String, ProviderError> {
        let request = self.request(CLASSIFIER_PROMPT.to_string(), Self::single(text), 0.3, 10);
        let response = self.provider.send_message(request).await?;
        Ok(response.content)
    }
}

#[async_trait]
impl ResponseGenerator for CompanionModel {
    async fn reply(&self, history: &[Turn], emotion: Emotion) -> Result<String, ProviderError> {
        tracing::debug!(
            "Sending {} history turns to {}",
            history.len(),
            self.provider.name()
        );
        let request = self.request(
            companion_prompt(emotion),
            turns_to_chat_messages(history),
            0.8,
            200,
        );
        let response = self.provider.send_message(request).await?;
        Ok(response.content)
    }
}

#[async_trait]
impl TitleGenerator for CompanionModel {
    async fn title(&self, seed: &str) -> Result<String, ProviderError> {
        let request = self.request(TITLE_PROMPT.to_string(), Self::single(seed), 0.7, 20);
        let response = self.provider.send_message(request).await?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::providers::types::ChatResponse;

    struct RecordingProvider {
        requests: Mutex<Vec<ChatRequest>>,
        answer: String,
    }

    #[async_trait]
    impl AiProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(ChatResponse {
                content: self.answer.clone(),
                model: request.model,
                tokens_in: None,
                tokens_out: None,
            })
        }
    }

    fn companion(answer: &str) -> (Arc<RecordingProvider>, CompanionModel) {
        let provider = Arc::new(RecordingProvider {
            requests: Mutex::new(Vec::new()),
            answer: answer.to_string(),
        });
        let model = CompanionModel::new(provider.clone(), "test-model");
        (provider, model)
    }

    #[tokio::test]
    async fn test_reply_sends_full_history() {
        let (provider, model) = companion("I'm here.");
        let history = vec![
            Turn::user("hello"),
            Turn::assistant("hi there", Emotion::Neutral),
            Turn::user("I can't sleep"),
        ];

        let reply = model.reply(&history, Emotion::Anxious).await.unwrap();
        assert_eq!(reply, "I'm here.");

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 3);
        assert_eq!(requests[0].messages[2].content, "I can't sleep");
        assert!(requests[0]
            .system_prompt
            .as_deref()
            .unwrap()
            .contains("Detected emotion: anxious"));
        assert_eq!(requests[0].max_tokens, Some(200));
    }

    #[tokio::test]
    async fn test_classify_returns_raw_label() {
        let (provider, model) = companion("Anxious.");
        let label = model.classify("I can't sleep, I'm so anxious").await.unwrap();
        assert_eq!(label, "Anxious.");
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, Some(10));
        assert_eq!(requests[0].messages.len(), 1);
    }
}
