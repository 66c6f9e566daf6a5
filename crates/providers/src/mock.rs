//! Mock implementation of ChatBackend for testing
//!
//! Generates scripted responses without requiring network access. Replies
//! are consumed in order; when the script runs out, a fixed default answer
//! is produced so simple tests need no setup.

use crate::models::{
    ChatOutcome, ChatParams, ProviderDelta, ProviderId, UpstreamError,
};
use crate::{ChatBackend, DeltaStream};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this outcome from `complete`, or stream its text word-by-word
    Complete(ChatOutcome),
    /// Stream exactly these deltas
    Stream(Vec<ProviderDelta>),
    /// Fail the call
    Fail(UpstreamError),
}

pub struct MockBackend {
    provider: ProviderId,
    replies: Mutex<VecDeque<MockReply>>,
    seen_params: Mutex<Vec<ChatParams>>,
}

impl MockBackend {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            replies: Mutex::new(VecDeque::new()),
            seen_params: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(provider: ProviderId, reply: MockReply) -> Self {
        let backend = Self::new(provider);
        backend.push_reply(reply);
        backend
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Parameters of every request this backend has served, in order
    pub fn seen_params(&self) -> Vec<ChatParams> {
        self.seen_params.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen_params.lock().unwrap().len()
    }

    fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::Complete(ChatOutcome {
                text: "This is a mock response.".to_string(),
                reasoning: None,
                tool_calls: Vec::new(),
            }))
    }

    /// Split text into word-level content deltas followed by `Done`
    fn chunk_text(text: &str) -> Vec<ProviderDelta> {
        let mut deltas = Vec::new();
        for (i, word) in text.split(' ').enumerate() {
            let piece = if i == 0 {
                word.to_string()
            } else {
                format!(" {word}")
            };
            deltas.push(ProviderDelta::Content(piece));
        }
        deltas.push(ProviderDelta::Done);
        deltas
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn complete(&self, params: ChatParams) -> Result<ChatOutcome, UpstreamError> {
        self.seen_params.lock().unwrap().push(params);

        match self.next_reply() {
            MockReply::Complete(outcome) => Ok(outcome),
            MockReply::Stream(deltas) => {
                // Assemble the streamed script into a single outcome
                let mut outcome = ChatOutcome::default();
                let mut acc = crate::models::ToolCallAccumulator::default();
                for delta in deltas {
                    match delta {
                        ProviderDelta::Content(c) => outcome.text.push_str(&c),
                        ProviderDelta::Reasoning(r) => {
                            outcome.reasoning.get_or_insert_with(String::new).push_str(&r)
                        }
                        ProviderDelta::ToolCall(tc) => acc.push(tc),
                        ProviderDelta::Done => break,
                    }
                }
                outcome.tool_calls = acc.finish();
                Ok(outcome)
            }
            MockReply::Fail(err) => Err(err),
        }
    }

    async fn stream(&self, params: ChatParams) -> Result<DeltaStream, UpstreamError> {
        self.seen_params.lock().unwrap().push(params);

        let deltas = match self.next_reply() {
            MockReply::Stream(deltas) => deltas,
            MockReply::Complete(outcome) => {
                let mut deltas = Vec::new();
                if let Some(reasoning) = &outcome.reasoning {
                    deltas.push(ProviderDelta::Reasoning(reasoning.clone()));
                }
                let mut chunks = Self::chunk_text(&outcome.text);
                deltas.append(&mut chunks);
                deltas
            }
            MockReply::Fail(err) => return Err(err),
        };

        Ok(Box::pin(futures_util::stream::iter(
            deltas.into_iter().map(Ok::<_, UpstreamError>),
        )))
    }
}
