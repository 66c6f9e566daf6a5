//! Grok backend implementation (xAI).
//!
//! OpenAI-style chat completions endpoint. Streamed deltas may carry a
//! `reasoning` field alongside `content`; both are forwarded independently.
//! End-of-stream is the literal `data: [DONE]` line.

use crate::models::{ChatOutcome, ChatParams, ProviderDelta, ProviderId, UpstreamError};
use crate::sse::{SseDeltaStream, SseEventParser};
use crate::{wire, BackendConfig, ChatBackend, DeltaStream};
use async_trait::async_trait;
use reqwest::{header::HeaderValue, Client};

pub struct GrokBackend {
    client: Client,
    config: BackendConfig,
}

impl GrokBackend {
    pub fn new(config: BackendConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn build_headers(&self) -> Result<reqwest::header::HeaderMap, UpstreamError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let auth_value = format!("Bearer {}", self.config.api_key);
        let header_value = HeaderValue::from_str(&auth_value)
            .map_err(|e| UpstreamError::Transport(format!("Invalid API key format: {e}")))?;
        headers.insert("Authorization", header_value);

        Ok(headers)
    }

    async fn send(
        &self,
        params: ChatParams,
        stream: bool,
    ) -> Result<reqwest::Response, UpstreamError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = wire::ChatRequest::from_params(&self.config.model, params, stream);
        let headers = self.build_headers()?;

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
impl ChatBackend for GrokBackend {
    fn provider(&self) -> ProviderId {
        ProviderId::Grok
    }

    async fn complete(&self, params: ChatParams) -> Result<ChatOutcome, UpstreamError> {
        let response = self.send(params, false).await?;
        let parsed: wire::ChatResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(format!("Failed to parse response: {e}")))?;
        wire::outcome_from_response(parsed)
    }

    async fn stream(&self, params: ChatParams) -> Result<DeltaStream, UpstreamError> {
        let response = self.send(params, true).await?;
        Ok(Box::pin(SseDeltaStream::new(
            response.bytes_stream(),
            GrokEventParser,
        )))
    }
}

/// Parses one Grok SSE payload into deltas.
///
/// `reasoning` and `content` are optional and independent within a single
/// chunk; a malformed payload is skipped without failing the stream.
pub struct GrokEventParser;

impl SseEventParser for GrokEventParser {
    fn parse_event(&mut self, data: &str) -> Vec<ProviderDelta> {
        if data == "[DONE]" {
            return vec![ProviderDelta::Done];
        }

        let chunk: wire::ChatChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(_) => {
                tracing::debug!("skipping malformed grok stream chunk");
                return vec![];
            }
        };

        let mut deltas = Vec::new();
        if let Some(delta) = chunk.choices.into_iter().next().and_then(|c| c.delta) {
            if let Some(reasoning) = delta.reasoning {
                if !reasoning.is_empty() {
                    deltas.push(ProviderDelta::Reasoning(reasoning));
                }
            }
            if let Some(content) = delta.content {
                if !content.is_empty() {
                    deltas.push(ProviderDelta::Content(content));
                }
            }
            for tool_call in delta.tool_calls.unwrap_or_default() {
                deltas.push(ProviderDelta::ToolCall(tool_call.into_delta()));
            }
        }
        deltas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::StreamExt;

    fn parse_all(lines: &[&str]) -> Vec<ProviderDelta> {
        let mut parser = GrokEventParser;
        lines
            .iter()
            .flat_map(|line| parser.parse_event(line))
            .collect()
    }

    #[test]
    fn test_content_and_reasoning_deltas() {
        let deltas = parse_all(&[
            r#"{"choices":[{"delta":{"reasoning":"Thinking about"}}]}"#,
            r#"{"choices":[{"delta":{"reasoning":" it.","content":"Dia"}}]}"#,
            r#"{"choices":[{"delta":{"content":"betes is..."}}]}"#,
            "[DONE]",
        ]);

        let content: String = deltas
            .iter()
            .filter_map(|d| match d {
                ProviderDelta::Content(c) => Some(c.as_str()),
                _ => None,
            })
            .collect();
        let reasoning: String = deltas
            .iter()
            .filter_map(|d| match d {
                ProviderDelta::Reasoning(r) => Some(r.as_str()),
                _ => None,
            })
            .collect();

        assert_eq!(content, "Diabetes is...");
        assert_eq!(reasoning, "Thinking about it.");
        assert_eq!(deltas.last(), Some(&ProviderDelta::Done));
    }

    #[test]
    fn test_malformed_chunk_skipped() {
        let deltas = parse_all(&[
            r#"{"choices":[{"delta":{"content":"a"}}]}"#,
            r#"{not valid json"#,
            r#"{"choices":[{"delta":{"content":"b"}}]}"#,
        ]);
        assert_eq!(
            deltas,
            vec![
                ProviderDelta::Content("a".to_string()),
                ProviderDelta::Content("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_reasoning_content_alias_accepted() {
        let deltas =
            parse_all(&[r#"{"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#]);
        assert_eq!(deltas, vec![ProviderDelta::Reasoning("hmm".to_string())]);
    }

    #[test]
    fn test_streamed_tool_call_fragments() {
        let deltas = parse_all(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"web_search","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":\"flu\"}"}}]}}]}"#,
        ]);

        let mut acc = crate::models::ToolCallAccumulator::default();
        for delta in deltas {
            if let ProviderDelta::ToolCall(tc) = delta {
                acc.push(tc);
            }
        }
        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[0].arguments, "{\"query\":\"flu\"}");
    }

    #[tokio::test]
    async fn test_full_stream_terminates_once() {
        let frames: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            )),
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\ndata: [DONE]\n\n",
            )),
        ];
        let stream =
            SseDeltaStream::new(futures_util::stream::iter(frames), GrokEventParser);
        let deltas: Vec<_> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(
            deltas,
            vec![
                ProviderDelta::Content("Hello".to_string()),
                ProviderDelta::Content(" world".to_string()),
                ProviderDelta::Done,
            ]
        );
    }
}
