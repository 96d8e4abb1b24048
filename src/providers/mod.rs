pub mod companion;
pub mod openai;
pub mod prompts;
pub mod traits;
pub mod types;

pub use companion::CompanionModel;
pub use openai::OpenAiProvider;
pub use traits::{AiProvider, EmotionClassifier, ResponseGenerator, TitleGenerator};
pub use types::{ChatMessage, ChatRequest, ChatResponse, ProviderError};
