pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AppConfig;
pub use error::LifecycleError;
pub use services::ConversationLifecycleManager;
