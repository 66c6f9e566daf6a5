use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Identifier for one configured upstream provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Grok,
    OpenAi,
    Gemini,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grok => "grok",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry in the canonical message list shared by all adapters.
///
/// Adapters translate this into their provider-specific wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Set on tool-result messages to link back to the originating call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on assistant messages that requested tool invocations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: Some(calls),
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
        }
    }
}

/// A complete tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments object
    pub arguments: String,
}

/// Definition of a tool the model may call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object
    pub parameters: serde_json::Value,
}

/// Parameters for one completion request, shared by all adapters.
///
/// The model id is adapter-local configuration, not a caller concern.
#[derive(Debug, Clone, Default)]
pub struct ChatParams {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i64>,
    /// Tools bound for this request; empty means none
    pub tools: Vec<ToolDefinition>,
}

impl ChatParams {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }
}

/// Result of a non-streaming completion
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    pub text: String,
    pub reasoning: Option<String>,
    /// Tool invocations requested by the model, if any
    pub tool_calls: Vec<ToolCall>,
}

/// One incremental fragment of a streaming completion.
///
/// A stream yields any number of `Content` / `Reasoning` / `ToolCall`
/// fragments and terminates with exactly one `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderDelta {
    Content(String),
    Reasoning(String),
    ToolCall(ToolCallDelta),
    Done,
}

/// Streamed fragment of a tool call; fields arrive across several chunks
/// and are merged by index.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCallDelta {
    pub index: i64,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Merges streamed tool-call fragments into complete calls, keyed by index
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    partial: BTreeMap<i64, PartialCall>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn push(&mut self, delta: ToolCallDelta) {
        let entry = self.partial.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            entry.id = Some(id);
        }
        if let Some(name) = delta.name {
            entry.name = Some(name);
        }
        if let Some(arguments) = delta.arguments {
            entry.arguments.push_str(&arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.partial.is_empty()
    }

    /// Completed calls in index order; fragments that never received a
    /// function name are dropped.
    pub fn finish(self) -> Vec<ToolCall> {
        self.partial
            .into_iter()
            .filter_map(|(index, partial)| {
                Some(ToolCall {
                    id: partial
                        .id
                        .unwrap_or_else(|| format!("call_{index}")),
                    name: partial.name?,
                    arguments: partial.arguments,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("upstream request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("no chat provider configured")]
    NoProviderConfigured,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_serialization() {
        assert_eq!(serde_json::to_string(&ProviderId::Grok).unwrap(), "\"grok\"");
        assert_eq!(
            serde_json::to_string(&ProviderId::OpenAi).unwrap(),
            "\"openai\""
        );
        assert_eq!(
            serde_json::to_string(&ProviderId::Gemini).unwrap(),
            "\"gemini\""
        );
    }

    #[test]
    fn test_message_role_serialization() {
        let msg = ChatMessage::tool("call_1", "result text");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"tool\""));
        assert!(json.contains("\"tool_call_id\":\"call_1\""));
    }

    #[test]
    fn test_tool_call_accumulator_merges_fragments() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(ToolCallDelta {
            index: 0,
            id: Some("call_abc".to_string()),
            name: Some("web_search".to_string()),
            arguments: Some("{\"query\":".to_string()),
        });
        acc.push(ToolCallDelta {
            index: 0,
            id: None,
            name: None,
            arguments: Some("\"diabetes\"}".to_string()),
        });

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[0].arguments, "{\"query\":\"diabetes\"}");
    }

    #[test]
    fn test_tool_call_accumulator_drops_nameless_fragments() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(ToolCallDelta {
            index: 0,
            id: None,
            name: None,
            arguments: Some("{}".to_string()),
        });
        assert!(acc.finish().is_empty());
    }

    #[test]
    fn test_tool_call_accumulator_orders_by_index() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(ToolCallDelta {
            index: 1,
            id: Some("b".to_string()),
            name: Some("second".to_string()),
            arguments: None,
        });
        acc.push(ToolCallDelta {
            index: 0,
            id: Some("a".to_string()),
            name: Some("first".to_string()),
            arguments: None,
        });

        let calls = acc.finish();
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[1].name, "second");
    }
}
