pub mod conversation;
pub mod emotion;
pub mod message;
pub mod turn;

pub use conversation::{Conversation, ConversationQuery};
pub use emotion::Emotion;
pub use message::{Message, Sender};
pub use turn::{Role, Turn};
