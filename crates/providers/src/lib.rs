//! Provider adapters for upstream chat backends
//!
//! This crate provides a single trait interface over several upstream chat
//! APIs with incompatible wire formats, so the orchestrating layers never
//! branch on provider identity:
//!
//! - **Grok** — OpenAI-style SSE with independent reasoning and content
//!   deltas, `[DONE]` sentinel termination.
//! - **OpenAI** — OpenAI-style SSE, content deltas only, `[DONE]` sentinel.
//! - **Gemini** — two-role turn format with cumulative streamed text
//!   (each frame carries the full output so far) and field-based
//!   termination; the adapter diffs frames and emits only the new suffix.
//!
//! Streams yield [`ProviderDelta`] fragments and terminate with exactly one
//! [`ProviderDelta::Done`]. Dropping a stream releases the underlying
//! connection, so callers may stop consuming at any point.

pub mod gemini;
pub mod grok;
pub mod mock;
pub mod models;
pub mod openai;
pub mod registry;
pub mod sse;
mod wire;

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

pub use gemini::GeminiBackend;
pub use grok::GrokBackend;
pub use mock::{MockBackend, MockReply};
pub use openai::OpenAiBackend;
pub use models::{
    ChatMessage, ChatOutcome, ChatParams, MessageRole, ProviderDelta, ProviderId, SelectError,
    ToolCall, ToolCallAccumulator, ToolCallDelta, ToolDefinition, UpstreamError,
};
pub use registry::ProviderRegistry;

/// Type alias for streaming completion results
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ProviderDelta, UpstreamError>> + Send>>;

/// Connection settings for one upstream backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL for the provider API
    pub base_url: String,
    /// API key for authentication
    pub api_key: String,
    /// Model id requested from this provider
    pub model: String,
    /// Client-side deadline for non-streaming calls, in seconds.
    /// Streaming calls have no overall deadline, only a connect timeout.
    pub timeout_secs: u64,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Identifies which provider this backend talks to
    fn provider(&self) -> ProviderId;

    /// Performs a non-streaming completion request.
    ///
    /// Fails with [`UpstreamError::Http`] on a non-success status,
    /// [`UpstreamError::Timeout`] when the client-side deadline elapses,
    /// and [`UpstreamError::InvalidResponse`] when the body does not match
    /// the provider's documented shape.
    async fn complete(&self, params: ChatParams) -> Result<ChatOutcome, UpstreamError>;

    /// Opens a streaming completion request.
    ///
    /// An error status on stream open fails the call; after that, the
    /// returned stream yields deltas in upstream arrival order and
    /// terminates with exactly one [`ProviderDelta::Done`]. Malformed
    /// individual chunks are skipped, not surfaced.
    async fn stream(&self, params: ChatParams) -> Result<DeltaStream, UpstreamError>;
}
