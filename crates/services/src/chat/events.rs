//! Client-facing stream envelope.
//!
//! Every provider's deltas are normalized into this one tagged union
//! before they reach the SSE channel. A stream is a sequence of events
//! terminated by exactly one event with `done: true` — either `done` or
//! `error`.

use crate::search::SearchResult;
use providers::ProviderId;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// First event of a stream: which provider will answer, and under
    /// which conversation the exchange is persisted
    Provider {
        provider: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        done: bool,
    },
    Content {
        data: String,
        done: bool,
    },
    Reasoning {
        data: String,
        done: bool,
    },
    /// The agent started a web search; `data` carries the query
    ToolStart {
        data: String,
        done: bool,
    },
    /// A search finished; `sources` carries everything collected so far
    ToolEnd {
        data: String,
        sources: Vec<SearchResult>,
        done: bool,
    },
    /// Terminal failure; closes the stream
    Error {
        error: String,
        done: bool,
    },
    /// Terminal success
    Done {
        done: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        search_performed: Option<bool>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        sources: Vec<SearchResult>,
    },
}

impl StreamEvent {
    pub fn provider(provider: ProviderId, conversation_id: Option<String>) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            conversation_id,
            done: false,
        }
    }

    pub fn content(data: impl Into<String>) -> Self {
        Self::Content {
            data: data.into(),
            done: false,
        }
    }

    pub fn reasoning(data: impl Into<String>) -> Self {
        Self::Reasoning {
            data: data.into(),
            done: false,
        }
    }

    pub fn tool_start(query: impl Into<String>) -> Self {
        Self::ToolStart {
            data: query.into(),
            done: false,
        }
    }

    pub fn tool_end(sources: Vec<SearchResult>) -> Self {
        Self::ToolEnd {
            data: "Search complete".to_string(),
            sources,
            done: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
            done: true,
        }
    }

    pub fn done() -> Self {
        Self::Done {
            done: true,
            search_performed: None,
            sources: Vec::new(),
        }
    }

    pub fn done_with_search(search_performed: bool, sources: Vec<SearchResult>) -> Self {
        Self::Done {
            done: true,
            search_performed: Some(search_performed),
            sources,
        }
    }

    /// Whether this event closes the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = StreamEvent::content("hi");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["data"], "hi");
        assert_eq!(json["done"], false);
    }

    #[test]
    fn test_provider_event_omits_absent_conversation() {
        let event = StreamEvent::provider(ProviderId::Grok, None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "provider");
        assert_eq!(json["provider"], "grok");
        assert!(json.get("conversation_id").is_none());
    }

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::done().is_terminal());
        assert!(StreamEvent::error("x").is_terminal());
        assert!(!StreamEvent::content("x").is_terminal());

        let json = serde_json::to_value(StreamEvent::error("boom")).unwrap();
        assert_eq!(json["done"], true);
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn test_tool_events_snake_case_tags() {
        let start = serde_json::to_value(StreamEvent::tool_start("flu")).unwrap();
        assert_eq!(start["type"], "tool_start");

        let end = serde_json::to_value(StreamEvent::tool_end(vec![])).unwrap();
        assert_eq!(end["type"], "tool_end");
        assert_eq!(end["data"], "Search complete");
    }
}
