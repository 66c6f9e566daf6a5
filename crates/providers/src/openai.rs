//! OpenAI backend implementation.
//!
//! Standard chat completions: same `data: ` framing and `[DONE]` sentinel
//! as Grok, but streamed deltas carry only `content` (plus tool-call
//! fragments when tools are bound).

use crate::models::{ChatOutcome, ChatParams, ProviderDelta, ProviderId, UpstreamError};
use crate::sse::{SseDeltaStream, SseEventParser};
use crate::{wire, BackendConfig, ChatBackend, DeltaStream};
use async_trait::async_trait;
use reqwest::{header::HeaderValue, Client};

pub struct OpenAiBackend {
    client: Client,
    config: BackendConfig,
}

impl OpenAiBackend {
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
impl ChatBackend for OpenAiBackend {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenAi
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
            OpenAiEventParser,
        )))
    }
}

/// Parses one OpenAI SSE payload: content deltas and tool-call fragments
pub struct OpenAiEventParser;

impl SseEventParser for OpenAiEventParser {
    fn parse_event(&mut self, data: &str) -> Vec<ProviderDelta> {
        if data == "[DONE]" {
            return vec![ProviderDelta::Done];
        }

        let chunk: wire::ChatChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(_) => {
                tracing::debug!("skipping malformed openai stream chunk");
                return vec![];
            }
        };

        let mut deltas = Vec::new();
        if let Some(delta) = chunk.choices.into_iter().next().and_then(|c| c.delta) {
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
