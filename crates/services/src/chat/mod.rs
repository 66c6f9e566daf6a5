//! Chat orchestrator.
//!
//! Drives a single request end to end: select a provider, create or reuse
//! the conversation, build the canonical message list, dispatch, normalize
//! the provider's deltas into [`StreamEvent`]s, and persist both sides of
//! the exchange. Persistence is always best-effort: a failed write is
//! logged and never affects the user-visible result.

pub mod events;

pub use events::StreamEvent;

use crate::conversations::{ConversationGateway, StoredMessage};
use crate::search::{SearchAgent, SearchResult};
use futures_util::StreamExt;
use providers::{
    ChatBackend, ChatMessage, ChatParams, MessageRole, ProviderDelta, ProviderRegistry,
    UpstreamError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// System prompt for the plain chat path
pub const SYSTEM_PROMPT: &str = "You are an expert medical assistant chatbot. Your role is to \
provide helpful, accurate, and empathetic medical information.\n\n\
Key guidelines:\n\
1. Provide clear, evidence-based medical information\n\
2. Be empathetic and understanding\n\
3. Always remind users that you are not a replacement for professional medical advice\n\
4. For serious symptoms or concerns, encourage users to consult healthcare professionals\n\
5. Use simple language that is easy to understand\n\
6. When discussing medications or treatments, mention the importance of consulting a doctor\n\
7. Be thorough but concise\n\n\
Remember: you educate and inform, you do not diagnose or prescribe treatment.";

const CHAT_TEMPERATURE: f32 = 0.7;
const CHAT_MAX_TOKENS: i64 = 1000;
const TIMEOUT_MESSAGE: &str = "Request timeout. Please try again.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryMessage>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Route this request through the search agent
    #[serde(default)]
    pub use_search: bool,
}

/// Structured chat result. The non-streaming endpoint always answers with
/// this shape; upstream failures land in `error` instead of propagating.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_performed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SearchResult>>,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no chat provider configured")]
    NoProviderConfigured,
}

#[derive(Clone)]
pub struct ChatService {
    registry: Arc<ProviderRegistry>,
    agent: Arc<SearchAgent>,
    conversations: Option<Arc<ConversationGateway>>,
}

impl ChatService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        agent: Arc<SearchAgent>,
        conversations: Option<Arc<ConversationGateway>>,
    ) -> Self {
        Self {
            registry,
            agent,
            conversations,
        }
    }

    fn role_from_str(role: &str) -> MessageRole {
        match role {
            "system" => MessageRole::System,
            "assistant" => MessageRole::Assistant,
            "tool" => MessageRole::Tool,
            _ => MessageRole::User,
        }
    }

    /// Canonical message list: system prompt, caller-supplied history, then
    /// the new user message.
    pub fn build_messages(history: &[HistoryMessage], message: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        for msg in history {
            messages.push(ChatMessage {
                role: Self::role_from_str(&msg.role),
                content: msg.content.clone(),
                tool_call_id: None,
                tool_calls: None,
            });
        }
        messages.push(ChatMessage::user(message));
        messages
    }

    fn params(request: &ChatRequest) -> ChatParams {
        ChatParams {
            messages: Self::build_messages(&request.conversation_history, &request.message),
            temperature: Some(CHAT_TEMPERATURE),
            max_tokens: Some(CHAT_MAX_TOKENS),
            tools: Vec::new(),
        }
    }

    /// Resolve the conversation id eagerly so it can be announced before
    /// the assistant's answer exists. `None` when persistence is disabled
    /// or the store is unavailable.
    async fn ensure_conversation(&self, user_id: &str, request: &ChatRequest) -> Option<String> {
        let gateway = self.conversations.as_ref()?;
        match gateway
            .ensure(user_id, request.conversation_id.as_deref(), &request.message)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "failed to resolve conversation");
                None
            }
        }
    }

    /// Detached best-effort write; never awaited by the response path
    fn persist_message(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        message: StoredMessage,
    ) {
        let (Some(gateway), Some(conversation_id)) =
            (self.conversations.clone(), conversation_id)
        else {
            return;
        };
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = gateway
                .append_message(&user_id, &conversation_id, message)
                .await
            {
                tracing::warn!(error = %e, conversation_id, "failed to persist message");
            }
        });
    }

    /// Non-streaming entry point. Fails only when no provider is
    /// configured; every other failure returns a structured response.
    pub async fn chat(&self, request: ChatRequest, user_id: &str) -> Result<ChatResponse, ChatError> {
        let backend = self
            .registry
            .select()
            .map_err(|_| ChatError::NoProviderConfigured)?;
        let provider = backend.provider();

        let conversation_id = self.ensure_conversation(user_id, &request).await;
        self.persist_message(
            user_id,
            conversation_id.as_deref(),
            StoredMessage::user(request.message.as_str()),
        );

        if request.use_search {
            return Ok(self
                .chat_with_search(backend, request, user_id, conversation_id)
                .await);
        }

        match backend.complete(Self::params(&request)).await {
            Ok(outcome) => {
                self.persist_message(
                    user_id,
                    conversation_id.as_deref(),
                    StoredMessage::assistant(
                        outcome.text.clone(),
                        outcome.reasoning.clone(),
                        provider.as_str(),
                    ),
                );
                Ok(ChatResponse {
                    response: outcome.text,
                    success: true,
                    reasoning: outcome.reasoning,
                    provider: Some(provider.to_string()),
                    conversation_id,
                    ..Default::default()
                })
            }
            Err(UpstreamError::Timeout) => Ok(ChatResponse {
                success: false,
                error: Some(TIMEOUT_MESSAGE.to_string()),
                provider: Some(provider.to_string()),
                conversation_id,
                ..Default::default()
            }),
            Err(e) => {
                tracing::error!(provider = %provider, error = %e, "chat completion failed");
                Ok(ChatResponse {
                    success: false,
                    error: Some(e.to_string()),
                    provider: Some(provider.to_string()),
                    conversation_id,
                    ..Default::default()
                })
            }
        }
    }

    async fn chat_with_search(
        &self,
        backend: Arc<dyn ChatBackend>,
        request: ChatRequest,
        user_id: &str,
        conversation_id: Option<String>,
    ) -> ChatResponse {
        let provider = backend.provider();
        let agent_response = self
            .agent
            .run_with(backend, &request.message, &request.conversation_history)
            .await;

        if agent_response.success {
            self.persist_message(
                user_id,
                conversation_id.as_deref(),
                StoredMessage::assistant(agent_response.response.clone(), None, provider.as_str()),
            );
        }

        ChatResponse {
            response: agent_response.response,
            success: agent_response.success,
            error: agent_response.error,
            provider: agent_response.provider,
            conversation_id,
            search_performed: Some(agent_response.search_performed),
            sources: Some(agent_response.sources),
            ..Default::default()
        }
    }

    /// Streaming entry point. The returned stream is fed by a detached
    /// driver task, so a client disconnect never strands the upstream
    /// connection: the driver notices the closed channel, drops the
    /// upstream stream, and still flushes accumulated text to the store.
    pub fn chat_stream(&self, request: ChatRequest, user_id: &str) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let service = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            service.drive_stream(request, user_id, tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn drive_stream(
        self,
        request: ChatRequest,
        user_id: String,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let backend = match self.registry.select() {
            Ok(backend) => backend,
            Err(e) => {
                let _ = tx.send(StreamEvent::error(e.to_string())).await;
                return;
            }
        };
        let provider = backend.provider();

        // Announce the provider and conversation before dispatching, so the
        // client learns the conversation id ahead of the answer
        let conversation_id = self.ensure_conversation(&user_id, &request).await;
        if tx
            .send(StreamEvent::provider(provider, conversation_id.clone()))
            .await
            .is_err()
        {
            return;
        }
        self.persist_message(
            &user_id,
            conversation_id.as_deref(),
            StoredMessage::user(request.message.as_str()),
        );

        if request.use_search {
            self.drive_agent_stream(backend, request, &user_id, conversation_id, tx)
                .await;
            return;
        }

        let mut stream = match backend.stream(Self::params(&request)).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = tx.send(StreamEvent::error(e.to_string())).await;
                return;
            }
        };

        let mut content = String::new();
        let mut reasoning = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(ProviderDelta::Content(data)) => {
                    content.push_str(&data);
                    if tx.send(StreamEvent::content(data)).await.is_err() {
                        break;
                    }
                }
                Ok(ProviderDelta::Reasoning(data)) => {
                    reasoning.push_str(&data);
                    if tx.send(StreamEvent::reasoning(data)).await.is_err() {
                        break;
                    }
                }
                Ok(ProviderDelta::ToolCall(_)) => {}
                Ok(ProviderDelta::Done) => {
                    let _ = tx.send(StreamEvent::done()).await;
                    break;
                }
                Err(e) => {
                    let _ = tx.send(StreamEvent::error(e.to_string())).await;
                    break;
                }
            }
        }
        drop(stream);

        // Flush whatever was accumulated, even on disconnect or error
        if !content.is_empty() {
            let reasoning = (!reasoning.is_empty()).then_some(reasoning);
            self.persist_message(
                &user_id,
                conversation_id.as_deref(),
                StoredMessage::assistant(content, reasoning, provider.as_str()),
            );
        }
    }

    async fn drive_agent_stream(
        &self,
        backend: Arc<dyn ChatBackend>,
        request: ChatRequest,
        user_id: &str,
        conversation_id: Option<String>,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let provider = backend.provider();
        let mut inner = self.agent.run_stream_with(
            backend,
            request.message.clone(),
            request.conversation_history.clone(),
        );

        let mut content = String::new();
        while let Some(event) = inner.next().await {
            if let StreamEvent::Content { data, .. } = &event {
                content.push_str(data);
            }
            let terminal = event.is_terminal();
            if tx.send(event).await.is_err() {
                break;
            }
            if terminal {
                break;
            }
        }

        if !content.is_empty() {
            self.persist_message(
                user_id,
                conversation_id.as_deref(),
                StoredMessage::assistant(content, None, provider.as_str()),
            );
        }
    }
}
