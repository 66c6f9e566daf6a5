pub mod gateway;
pub mod models;

pub use gateway::{ConversationError, ConversationGateway};
pub use models::{Conversation, StoredMessage};
