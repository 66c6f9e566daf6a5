//! Tool-calling search agent.
//!
//! A two-node cyclic loop: the agent node asks the selected model for a
//! turn with the `web_search` tool bound; if the turn requests tool calls
//! the tools node executes them and feeds the results back, otherwise the
//! turn's text is the final answer. The loop is bounded by configuration:
//! once the round-trip budget is spent the final turn runs with no tool
//! bound, so the model must answer with what it has.

pub mod engines;

use crate::chat::events::StreamEvent;
use crate::chat::HistoryMessage;
use chrono::Utc;
use futures_util::StreamExt;
use providers::{
    ChatBackend, ChatMessage, ChatParams, MessageRole, ProviderDelta, ProviderRegistry,
    ToolCallAccumulator, ToolDefinition,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub use engines::{extract_sources, format_search_results, SearchResult, SearchRouter};

const AGENT_TEMPERATURE: f32 = 0.7;
const AGENT_MAX_TOKENS: i64 = 1500;

/// Result of a non-streaming agent run
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub response: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub search_performed: bool,
    pub sources: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Clone)]
pub struct SearchAgent {
    registry: Arc<ProviderRegistry>,
    router: Arc<SearchRouter>,
    max_turns: usize,
}

fn web_search_tool() -> ToolDefinition {
    ToolDefinition {
        name: "web_search".to_string(),
        description: "Search the web for current information. Use this for recent news, \
                      drug approvals, treatment guidelines, statistics, or anything that \
                      may have changed since your training data."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to look up"
                }
            },
            "required": ["query"]
        }),
    }
}

/// System prompt for the agent, with the current date interpolated so the
/// model knows its training data may lag behind.
fn agent_system_prompt() -> String {
    let now = Utc::now();
    let today = now.format("%B %d, %Y");
    let year = now.format("%Y");

    format!(
        "You are an expert medical assistant with web search capabilities.\n\n\
         TODAY'S DATE: {today}\n\n\
         You MUST use the web_search tool for questions about recent events, drug \
         approvals, regulatory decisions, treatment guidelines, current statistics, \
         or new research. Your training data may be outdated; if a question involves \
         recent, current, or {year} information, search before answering.\n\n\
         Guidelines:\n\
         1. Search first when the question involves recent or current information\n\
         2. Cite your sources from the search results\n\
         3. Be transparent about what comes from search versus your own knowledge\n\
         4. Be precise and concise, and structure complex information clearly"
    )
}

fn query_from_arguments(arguments: &str) -> String {
    serde_json::from_str::<serde_json::Value>(arguments)
        .ok()
        .and_then(|v| v.get("query").and_then(|q| q.as_str()).map(String::from))
        .unwrap_or_default()
}

impl SearchAgent {
    pub fn new(registry: Arc<ProviderRegistry>, router: Arc<SearchRouter>, max_turns: usize) -> Self {
        Self {
            registry,
            router,
            max_turns,
        }
    }

    fn build_messages(history: &[HistoryMessage], message: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(agent_system_prompt())];
        for msg in history {
            let role = match msg.role.as_str() {
                "assistant" => MessageRole::Assistant,
                _ => MessageRole::User,
            };
            messages.push(ChatMessage {
                role,
                content: msg.content.clone(),
                tool_call_id: None,
                tool_calls: None,
            });
        }
        messages.push(ChatMessage::user(message));
        messages
    }

    fn params(&self, messages: Vec<ChatMessage>, final_turn: bool) -> ChatParams {
        ChatParams {
            messages,
            temperature: Some(AGENT_TEMPERATURE),
            max_tokens: Some(AGENT_MAX_TOKENS),
            tools: if final_turn {
                vec![]
            } else {
                vec![web_search_tool()]
            },
        }
    }

    /// Run the agent loop to completion and return the final answer.
    /// Provider selection mirrors the chat orchestrator's policy.
    pub async fn run(&self, message: &str, history: &[HistoryMessage]) -> AgentResponse {
        match self.registry.select() {
            Ok(backend) => self.run_with(backend, message, history).await,
            Err(e) => AgentResponse {
                response: String::new(),
                success: false,
                error: Some(e.to_string()),
                search_performed: false,
                sources: Vec::new(),
                provider: None,
            },
        }
    }

    /// Run the agent loop against an already-selected backend
    pub async fn run_with(
        &self,
        backend: Arc<dyn ChatBackend>,
        message: &str,
        history: &[HistoryMessage],
    ) -> AgentResponse {
        let mut failure = AgentResponse {
            response: String::new(),
            success: false,
            error: None,
            search_performed: false,
            sources: Vec::new(),
            provider: None,
        };

        let provider = backend.provider();
        failure.provider = Some(provider.to_string());

        let mut messages = Self::build_messages(history, message);
        let mut sources = Vec::new();
        let mut search_performed = false;

        for turn in 0..=self.max_turns {
            let final_turn = turn == self.max_turns;
            let outcome = match backend.complete(self.params(messages.clone(), final_turn)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    failure.error = Some(e.to_string());
                    failure.search_performed = search_performed;
                    failure.sources = sources;
                    return failure;
                }
            };

            if final_turn || outcome.tool_calls.is_empty() {
                return AgentResponse {
                    response: outcome.text,
                    success: true,
                    error: None,
                    search_performed,
                    sources,
                    provider: Some(provider.to_string()),
                };
            }

            search_performed = true;
            messages.push(ChatMessage::assistant_tool_calls(outcome.tool_calls.clone()));
            for call in outcome.tool_calls {
                let query = query_from_arguments(&call.arguments);
                let result_text = self.router.web_search(&query).await;
                sources.extend(extract_sources(&result_text));
                messages.push(ChatMessage::tool(call.id, result_text));
            }
        }

        // Unreachable: the final turn always returns above
        failure.error = Some("agent produced no final answer".to_string());
        failure
    }

    /// Streaming variant: every turn streams with the tool bound, tool-call
    /// fragments are accumulated off to the side, and a turn that ends with
    /// no accumulated calls was the final answer.
    pub fn run_stream(
        &self,
        message: String,
        history: Vec<HistoryMessage>,
    ) -> ReceiverStream<StreamEvent> {
        match self.registry.select() {
            Ok(backend) => self.run_stream_with(backend, message, history),
            Err(e) => {
                let (tx, rx) = mpsc::channel(1);
                let _ = tx.try_send(StreamEvent::error(e.to_string()));
                ReceiverStream::new(rx)
            }
        }
    }

    /// Streaming run against an already-selected backend
    pub fn run_stream_with(
        &self,
        backend: Arc<dyn ChatBackend>,
        message: String,
        history: Vec<HistoryMessage>,
    ) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let agent = self.clone();
        tokio::spawn(async move {
            agent.drive_stream(backend, message, history, tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn drive_stream(
        self,
        backend: Arc<dyn ChatBackend>,
        message: String,
        history: Vec<HistoryMessage>,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let mut messages = Self::build_messages(&history, &message);
        let mut sources: Vec<SearchResult> = Vec::new();
        let mut search_performed = false;

        for turn in 0..=self.max_turns {
            let final_turn = turn == self.max_turns;
            let mut stream = match backend.stream(self.params(messages.clone(), final_turn)).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(StreamEvent::error(e.to_string())).await;
                    return;
                }
            };

            let mut accumulator = ToolCallAccumulator::default();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(ProviderDelta::Content(content)) => {
                        if tx.send(StreamEvent::content(content)).await.is_err() {
                            return;
                        }
                    }
                    Ok(ProviderDelta::Reasoning(reasoning)) => {
                        if tx.send(StreamEvent::reasoning(reasoning)).await.is_err() {
                            return;
                        }
                    }
                    Ok(ProviderDelta::ToolCall(fragment)) => accumulator.push(fragment),
                    Ok(ProviderDelta::Done) => break,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::error(e.to_string())).await;
                        return;
                    }
                }
            }
            drop(stream);

            let calls = accumulator.finish();
            if final_turn || calls.is_empty() {
                let _ = tx
                    .send(StreamEvent::done_with_search(search_performed, sources))
                    .await;
                return;
            }

            search_performed = true;
            messages.push(ChatMessage::assistant_tool_calls(calls.clone()));
            for call in calls {
                let query = query_from_arguments(&call.arguments);
                let announced = if query.is_empty() {
                    "web".to_string()
                } else {
                    query.clone()
                };
                if tx.send(StreamEvent::tool_start(announced)).await.is_err() {
                    return;
                }

                let result_text = self.router.web_search(&query).await;
                sources.extend(extract_sources(&result_text));
                if tx
                    .send(StreamEvent::tool_end(sources.clone()))
                    .await
                    .is_err()
                {
                    return;
                }
                messages.push(ChatMessage::tool(call.id, result_text));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::{ChatOutcome, MockBackend, MockReply, ProviderId, ToolCall, UpstreamError};

    fn tool_call_outcome(query: &str) -> ChatOutcome {
        ChatOutcome {
            text: String::new(),
            reasoning: None,
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: "web_search".to_string(),
                arguments: format!("{{\"query\":\"{query}\"}}"),
            }],
        }
    }

    fn answer_outcome(text: &str) -> ChatOutcome {
        ChatOutcome {
            text: text.to_string(),
            reasoning: None,
            tool_calls: Vec::new(),
        }
    }

    fn agent_with(backend: Arc<MockBackend>, max_turns: usize) -> SearchAgent {
        SearchAgent::new(
            Arc::new(ProviderRegistry::new(vec![backend])),
            Arc::new(SearchRouter::new(vec![])),
            max_turns,
        )
    }

    #[tokio::test]
    async fn test_direct_answer_without_search() {
        let backend = Arc::new(MockBackend::with_reply(
            ProviderId::OpenAi,
            MockReply::Complete(answer_outcome("No search needed.")),
        ));
        let agent = agent_with(backend.clone(), 5);

        let result = agent.run("What is aspirin?", &[]).await;
        assert!(result.success);
        assert_eq!(result.response, "No search needed.");
        assert!(!result.search_performed);
        assert!(result.sources.is_empty());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_tool_round_trip_then_answer() {
        let backend = Arc::new(MockBackend::new(ProviderId::OpenAi));
        backend.push_reply(MockReply::Complete(tool_call_outcome("flu vaccines 2026")));
        backend.push_reply(MockReply::Complete(answer_outcome("Based on the search...")));
        let agent = agent_with(backend.clone(), 5);

        let result = agent.run("Latest flu vaccine news?", &[]).await;
        assert!(result.success);
        assert!(result.search_performed);
        assert_eq!(result.response, "Based on the search...");
        assert_eq!(backend.calls(), 2);

        // The second request must carry the tool exchange
        let params = backend.seen_params();
        let roles: Vec<_> = params[1].messages.iter().map(|m| m.role).collect();
        assert!(roles.contains(&MessageRole::Tool));
    }

    #[tokio::test]
    async fn test_turn_bound_forces_final_answer() {
        let backend = Arc::new(MockBackend::new(ProviderId::OpenAi));
        for _ in 0..10 {
            backend.push_reply(MockReply::Complete(tool_call_outcome("again")));
        }
        let agent = agent_with(backend.clone(), 2);

        let result = agent.run("keep searching", &[]).await;
        // Turns 0 and 1 search; turn 2 is forced to answer without the tool
        assert_eq!(backend.calls(), 3);
        assert!(result.success);
        assert!(result.search_performed);

        let params = backend.seen_params();
        assert!(!params[0].tools.is_empty());
        assert!(!params[1].tools.is_empty());
        assert!(params[2].tools.is_empty());
    }

    #[tokio::test]
    async fn test_no_provider_configured() {
        let agent = SearchAgent::new(
            Arc::new(ProviderRegistry::default()),
            Arc::new(SearchRouter::new(vec![])),
            5,
        );
        let result = agent.run("hi", &[]).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no chat provider"));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_structured() {
        let backend = Arc::new(MockBackend::with_reply(
            ProviderId::Grok,
            MockReply::Fail(UpstreamError::Timeout),
        ));
        let agent = agent_with(backend, 5);

        let result = agent.run("hi", &[]).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_stream_emits_tool_events_and_done() {
        let backend = Arc::new(MockBackend::new(ProviderId::OpenAi));
        backend.push_reply(MockReply::Stream(vec![
            ProviderDelta::ToolCall(providers::ToolCallDelta {
                index: 0,
                id: Some("call_1".to_string()),
                name: Some("web_search".to_string()),
                arguments: Some("{\"query\":\"measles outbreak\"}".to_string()),
            }),
            ProviderDelta::Done,
        ]));
        backend.push_reply(MockReply::Stream(vec![
            ProviderDelta::Content("All".to_string()),
            ProviderDelta::Content(" clear.".to_string()),
            ProviderDelta::Done,
        ]));
        let agent = agent_with(backend, 5);

        let events: Vec<_> = agent
            .run_stream("Any measles news?".to_string(), vec![])
            .collect()
            .await;

        assert!(matches!(events[0], StreamEvent::ToolStart { .. }));
        assert!(matches!(events[1], StreamEvent::ToolEnd { .. }));
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Content { data, .. } => Some(data.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "All clear.");
        match events.last().unwrap() {
            StreamEvent::Done {
                done,
                search_performed,
                ..
            } => {
                assert!(*done);
                assert_eq!(*search_performed, Some(true));
            }
            other => panic!("expected done event, got {other:?}"),
        }
    }

    #[test]
    fn test_query_from_arguments() {
        assert_eq!(
            query_from_arguments("{\"query\":\"flu shots\"}"),
            "flu shots"
        );
        assert_eq!(query_from_arguments("not json"), "");
        assert_eq!(query_from_arguments("{}"), "");
    }

    #[test]
    fn test_system_prompt_carries_current_date() {
        let prompt = agent_system_prompt();
        let year = Utc::now().format("%Y").to_string();
        assert!(prompt.contains(&year));
        assert!(prompt.contains("web_search"));
    }
}
