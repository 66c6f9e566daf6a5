//! OpenAI-style chat completions wire format.
//!
//! The Grok and OpenAI backends speak the same request framing; this module
//! holds the shared request/response structs and their translation to the
//! canonical types so the two adapters only differ in what they read out of
//! streamed deltas.

use crate::models::{
    ChatMessage, ChatOutcome, ChatParams, MessageRole, ToolCall, UpstreamError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
}

impl ChatRequest {
    pub fn from_params(model: &str, params: ChatParams, stream: bool) -> Self {
        let tools = if params.tools.is_empty() {
            None
        } else {
            Some(
                params
                    .tools
                    .into_iter()
                    .map(|t| WireTool {
                        type_: "function".to_string(),
                        function: WireFunctionDef {
                            name: t.name,
                            description: t.description,
                            parameters: t.parameters,
                        },
                    })
                    .collect(),
            )
        };

        Self {
            model: model.to_string(),
            messages: params.messages.into_iter().map(WireMessage::from).collect(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream,
            tools,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage {
    pub role: MessageRole,
    /// Null is valid on assistant messages that only carry tool calls
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

impl From<ChatMessage> for WireMessage {
    fn from(msg: ChatMessage) -> Self {
        let tool_calls = msg.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|c| WireToolCall {
                    id: c.id,
                    type_: "function".to_string(),
                    function: WireFunctionCall {
                        name: c.name,
                        arguments: c.arguments,
                    },
                })
                .collect()
        });
        let content = if msg.content.is_empty() && tool_calls.is_some() {
            None
        } else {
            Some(msg.content)
        };

        Self {
            role: msg.role,
            content,
            tool_call_id: msg.tool_call_id,
            tool_calls,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireTool {
    #[serde(rename = "type")]
    pub type_: String,
    pub function: WireFunctionDef,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

// ==================== Non-streaming response ====================

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseChoice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    pub content: Option<String>,
    /// Some providers name this `reasoning_content`
    #[serde(alias = "reasoning_content")]
    pub reasoning: Option<String>,
    pub tool_calls: Option<Vec<WireToolCall>>,
}

/// Translate a parsed response into a canonical outcome, failing fast when
/// the shape does not match (no choices).
pub(crate) fn outcome_from_response(response: ChatResponse) -> Result<ChatOutcome, UpstreamError> {
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        UpstreamError::InvalidResponse("response contained no choices".to_string())
    })?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| ToolCall {
            id: c.id,
            name: c.function.name,
            arguments: c.function.arguments,
        })
        .collect();

    Ok(ChatOutcome {
        text: choice.message.content.unwrap_or_default(),
        reasoning: choice.message.reasoning.filter(|r| !r.is_empty()),
        tool_calls,
    })
}

// ==================== Streaming chunks ====================

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChunk {
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    pub delta: Option<ChunkDelta>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChunkDelta {
    pub content: Option<String>,
    /// Some providers name this `reasoning_content`
    #[serde(alias = "reasoning_content")]
    pub reasoning: Option<String>,
    pub tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkToolCall {
    #[serde(default)]
    pub index: i64,
    pub id: Option<String>,
    pub function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkFunction {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ChunkToolCall {
    pub fn into_delta(self) -> crate::models::ToolCallDelta {
        let (name, arguments) = match self.function {
            Some(f) => (f.name, f.arguments),
            None => (None, None),
        };
        crate::models::ToolCallDelta {
            index: self.index,
            id: self.id,
            name,
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatParams;

    #[test]
    fn test_request_serialization_without_tools() {
        let params = ChatParams {
            messages: vec![ChatMessage::system("be helpful"), ChatMessage::user("hi")],
            temperature: Some(0.7),
            max_tokens: Some(1000),
            tools: vec![],
        };
        let request = ChatRequest::from_params("grok-3", params, true);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "grok-3");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_assistant_tool_call_message_has_null_content() {
        let msg = ChatMessage::assistant_tool_calls(vec![ToolCall {
            id: "call_1".to_string(),
            name: "web_search".to_string(),
            arguments: "{\"query\":\"x\"}".to_string(),
        }]);
        let wire = WireMessage::from(msg);
        let json = serde_json::to_value(&wire).unwrap();

        assert!(json["content"].is_null());
        assert_eq!(json["tool_calls"][0]["function"]["name"], "web_search");
        assert_eq!(json["tool_calls"][0]["type"], "function");
    }

    #[test]
    fn test_outcome_from_response() {
        let json = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Diabetes is...",
                    "reasoning_content": "The user asks about diabetes."
                }
            }]
        }"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        let outcome = outcome_from_response(response).unwrap();

        assert_eq!(outcome.text, "Diabetes is...");
        assert_eq!(
            outcome.reasoning.as_deref(),
            Some("The user asks about diabetes.")
        );
        assert!(outcome.tool_calls.is_empty());
    }

    #[test]
    fn test_outcome_from_empty_choices_is_invalid() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            outcome_from_response(response),
            Err(UpstreamError::InvalidResponse(_))
        ));
    }
}
