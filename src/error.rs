use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Message is required")]
    EmptyInput,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Store(#[from] anyhow::Error),
}

pub type Result<T, E = LifecycleError> = std::result::Result<T, E>;
