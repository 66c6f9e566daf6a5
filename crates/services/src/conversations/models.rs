use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Conversation metadata as stored and listed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub last_message: String,
    pub message_count: i64,
    pub created_at: String,
    pub last_updated: String,
}

/// One persisted message within a conversation.
///
/// Immutable once written; ordered by timestamp within the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub timestamp: String,
}

impl StoredMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            reasoning: None,
            provider: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        reasoning: Option<String>,
        provider: &str,
    ) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            reasoning,
            provider: Some(provider.to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
