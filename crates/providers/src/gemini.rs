//! Gemini backend implementation.
//!
//! Gemini speaks a two-role turn format (`user` / `model`) with no native
//! system role; the system message is injected as a prefixed user turn.
//! Streamed frames are cumulative: each carries the full text generated so
//! far, so the parser diffs against the previously seen text and emits only
//! the new suffix. End-of-stream is signaled by the presence of a
//! `finishReason` field rather than a sentinel line.

use crate::models::{
    ChatMessage, ChatOutcome, ChatParams, MessageRole, ProviderDelta, ProviderId, ToolCall,
    ToolCallDelta, UpstreamError,
};
use crate::sse::{SseDeltaStream, SseEventParser};
use crate::{BackendConfig, ChatBackend, DeltaStream};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub struct GeminiBackend {
    client: Client,
    config: BackendConfig,
}

impl GeminiBackend {
    pub fn new(config: BackendConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Remap canonical messages onto Gemini's two-role turn model.
    ///
    /// The system message becomes a `"System instructions: ..."` user turn
    /// because the provider has no system role; assistant turns map to
    /// `model`; tool results are folded back in as user turns.
    fn convert_messages(messages: &[ChatMessage]) -> Vec<GeminiContent> {
        let mut contents = Vec::new();

        for msg in messages {
            match msg.role {
                MessageRole::System => {
                    contents.push(GeminiContent {
                        role: "user".to_string(),
                        parts: vec![GeminiPart::text(format!(
                            "System instructions: {}",
                            msg.content
                        ))],
                    });
                }
                MessageRole::User | MessageRole::Tool => {
                    contents.push(GeminiContent {
                        role: "user".to_string(),
                        parts: vec![GeminiPart::text(msg.content.clone())],
                    });
                }
                MessageRole::Assistant => {
                    let mut parts = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(GeminiPart::text(msg.content.clone()));
                    }
                    for call in msg.tool_calls.iter().flatten() {
                        let args = serde_json::from_str(&call.arguments)
                            .unwrap_or_else(|_| serde_json::json!({}));
                        parts.push(GeminiPart::function_call(call.name.clone(), args));
                    }
                    if parts.is_empty() {
                        parts.push(GeminiPart::text(String::new()));
                    }
                    contents.push(GeminiContent {
                        role: "model".to_string(),
                        parts,
                    });
                }
            }
        }

        contents
    }

    fn build_request(&self, params: ChatParams) -> GeminiRequest {
        let generation_config = if params.temperature.is_some() || params.max_tokens.is_some() {
            Some(GeminiGenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
            })
        } else {
            None
        };

        let tools = if params.tools.is_empty() {
            None
        } else {
            Some(vec![GeminiTools {
                function_declarations: params
                    .tools
                    .iter()
                    .map(|t| GeminiFunctionDeclaration {
                        name: t.name.clone(),
                        description: Some(t.description.clone()),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            }])
        };

        GeminiRequest {
            contents: Self::convert_messages(&params.messages),
            generation_config,
            tools,
        }
    }

    async fn send(
        &self,
        params: ChatParams,
        stream: bool,
    ) -> Result<reqwest::Response, UpstreamError> {
        // {base_url}/models/{model}:generateContent, streaming via
        // :streamGenerateContent?alt=sse; the key travels in a header
        let url = if stream {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.config.base_url, self.config.model
            )
        } else {
            format!(
                "{}/models/{}:generateContent",
                self.config.base_url, self.config.model
            )
        };

        let body = self.build_request(params);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Content-Type",
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "x-goog-api-key",
            reqwest::header::HeaderValue::from_str(&self.config.api_key)
                .map_err(|e| UpstreamError::Transport(format!("Invalid API key: {e}")))?,
        );

        let mut request = self.client.post(&url).headers(headers).json(&body);
        if !stream {
            request =
                request.timeout(std::time::Duration::from_secs(self.config.timeout_secs));
        }

        let response = request.send().await.map_err(UpstreamError::from)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error response body: {e}"));
            return Err(UpstreamError::Http { status, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn complete(&self, params: ChatParams) -> Result<ChatOutcome, UpstreamError> {
        let response = self.send(params, false).await?;
        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
            UpstreamError::InvalidResponse("response contained no candidates".to_string())
        })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(call) = part.function_call {
                tool_calls.push(ToolCall {
                    id: format!("call_{}", Uuid::new_v4().simple()),
                    name: call.name,
                    arguments: call.args.to_string(),
                });
            }
        }

        Ok(ChatOutcome {
            text,
            reasoning: None,
            tool_calls,
        })
    }

    async fn stream(&self, params: ChatParams) -> Result<DeltaStream, UpstreamError> {
        let response = self.send(params, true).await?;
        Ok(Box::pin(SseDeltaStream::new(
            response.bytes_stream(),
            GeminiEventParser::new(),
        )))
    }
}

// ==================== Wire types ====================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
}

impl GeminiPart {
    fn text(s: String) -> Self {
        Self {
            text: Some(s),
            function_call: None,
        }
    }

    fn function_call(name: String, args: serde_json::Value) -> Self {
        Self {
            text: None,
            function_call: Some(GeminiFunctionCall { name, args }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTools>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

// ==================== Streaming parser ====================

/// Diffs cumulative Gemini frames into suffix-only content deltas.
///
/// Completion is detected by `finishReason` presence, not by a fixed token.
pub struct GeminiEventParser {
    seen: String,
}

impl GeminiEventParser {
    pub fn new() -> Self {
        Self {
            seen: String::new(),
        }
    }
}

impl Default for GeminiEventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SseEventParser for GeminiEventParser {
    fn parse_event(&mut self, data: &str) -> Vec<ProviderDelta> {
        let response: GeminiResponse = match serde_json::from_str(data) {
            Ok(response) => response,
            Err(_) => {
                tracing::debug!("skipping malformed gemini stream frame");
                return vec![];
            }
        };

        let Some(candidate) = response.candidates.into_iter().next() else {
            return vec![];
        };

        let mut deltas = Vec::new();
        let mut full_text = String::new();
        let mut call_index = 0i64;

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(t) = part.text {
                full_text.push_str(&t);
            }
            if let Some(call) = part.function_call {
                deltas.push(ProviderDelta::ToolCall(ToolCallDelta {
                    index: call_index,
                    id: Some(format!("call_{}", Uuid::new_v4().simple())),
                    name: Some(call.name),
                    arguments: Some(call.args.to_string()),
                }));
                call_index += 1;
            }
        }

        if !full_text.is_empty() {
            // Frames are cumulative: emit only the suffix beyond what has
            // already been seen. A frame that does not extend the previous
            // text resets the baseline.
            let suffix = match full_text.strip_prefix(self.seen.as_str()) {
                Some(suffix) => suffix.to_string(),
                None => full_text.clone(),
            };
            if !suffix.is_empty() {
                deltas.insert(0, ProviderDelta::Content(suffix));
            }
            self.seen = full_text;
        }

        if candidate.finish_reason.is_some() {
            deltas.push(ProviderDelta::Done);
        }

        deltas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str, finish: Option<&str>) -> String {
        let finish = match finish {
            Some(f) => format!(",\"finishReason\":\"{f}\""),
            None => String::new(),
        };
        format!(
            "{{\"candidates\":[{{\"content\":{{\"parts\":[{{\"text\":\"{text}\"}}],\"role\":\"model\"}}{finish}}}]}}"
        )
    }

    #[test]
    fn test_cumulative_frames_emit_suffixes() {
        let mut parser = GeminiEventParser::new();
        let mut deltas = Vec::new();
        deltas.extend(parser.parse_event(&frame("Hi", None)));
        deltas.extend(parser.parse_event(&frame("Hi there", None)));
        deltas.extend(parser.parse_event(&frame("Hi there!", Some("STOP"))));

        assert_eq!(
            deltas,
            vec![
                ProviderDelta::Content("Hi".to_string()),
                ProviderDelta::Content(" there".to_string()),
                ProviderDelta::Content("!".to_string()),
                ProviderDelta::Done,
            ]
        );
    }

    #[test]
    fn test_repeated_frame_emits_nothing() {
        let mut parser = GeminiEventParser::new();
        parser.parse_event(&frame("Hello", None));
        let deltas = parser.parse_event(&frame("Hello", None));
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_non_extending_frame_resets_baseline() {
        let mut parser = GeminiEventParser::new();
        parser.parse_event(&frame("Hello world", None));
        let deltas = parser.parse_event(&frame("Different", None));
        assert_eq!(deltas, vec![ProviderDelta::Content("Different".to_string())]);
    }

    #[test]
    fn test_termination_by_finish_reason_field() {
        let mut parser = GeminiEventParser::new();
        let deltas = parser.parse_event(&frame("done now", Some("STOP")));
        assert_eq!(deltas.last(), Some(&ProviderDelta::Done));
    }

    #[test]
    fn test_function_call_frame() {
        let mut parser = GeminiEventParser::new();
        let data = r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"web_search","args":{"query":"flu shots"}}}],"role":"model"},"finishReason":"STOP"}]}"#;
        let deltas = parser.parse_event(data);

        assert_eq!(deltas.len(), 2);
        match &deltas[0] {
            ProviderDelta::ToolCall(tc) => {
                assert_eq!(tc.name.as_deref(), Some("web_search"));
                assert!(tc.arguments.as_deref().unwrap().contains("flu shots"));
            }
            other => panic!("expected tool call delta, got {other:?}"),
        }
        assert_eq!(deltas[1], ProviderDelta::Done);
    }

    #[test]
    fn test_system_message_injected_as_user_turn() {
        let messages = vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ];
        let contents = GeminiBackend::convert_messages(&messages);

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role, "user");
        assert_eq!(
            contents[0].parts[0].text.as_deref(),
            Some("System instructions: Be brief.")
        );
        assert_eq!(contents[1].role, "user");
        assert_eq!(contents[2].role, "model");
    }

    #[test]
    fn test_request_has_no_system_role() {
        let messages = vec![ChatMessage::system("x"), ChatMessage::user("y")];
        let contents = GeminiBackend::convert_messages(&messages);
        assert!(contents.iter().all(|c| c.role == "user" || c.role == "model"));
    }

    #[test]
    fn test_stream_url_format() {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            "https://generativelanguage.googleapis.com/v1beta", "gemini-2.0-flash"
        );
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }
}
