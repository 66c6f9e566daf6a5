//! Service layer for the chat gateway.
//!
//! - [`chat`] — the request orchestrator: provider selection, delta
//!   normalization, conversation persistence side effects.
//! - [`search`] — the tool-calling search agent and its engine adapters.
//! - [`conversations`] — conversation lifecycle over the document store.
//! - [`auth`] — bearer-token verification port.

pub mod auth;
pub mod chat;
pub mod conversations;
pub mod search;

pub use auth::{AuthError, MockVerifier, RemoteTokenVerifier, TokenVerifier, UserClaims};
pub use chat::{ChatError, ChatRequest, ChatResponse, ChatService, HistoryMessage, StreamEvent};
pub use conversations::{Conversation, ConversationError, ConversationGateway, StoredMessage};
pub use search::{AgentResponse, SearchAgent, SearchResult, SearchRouter};
