pub mod conversation;
pub mod database;
pub mod diagnostics;
pub mod history;
pub mod lifecycle;
pub mod store;

pub use database::Database;
pub use history::{EvictionPolicy, KeepLast, WorkingHistoryStore};
pub use lifecycle::{
    Capabilities, CleanupReport, ConversationLifecycleManager, MirrorOutcome, TurnReply,
};
pub use store::ConversationStore;
