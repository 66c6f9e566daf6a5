use serde::{Deserialize, Serialize};
use services::{Conversation, HistoryMessage, StoredMessage};

/// Error body shared by all endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_type: error_type.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessageBody {
    pub role: String,
    pub content: String,
}

/// Body of `POST /api/chat` and `POST /api/chat/stream`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequestBody {
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryMessageBody>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub use_search: bool,
}

impl ChatRequestBody {
    pub fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("message must not be empty".to_string());
        }
        Ok(())
    }

    pub fn into_request(self) -> services::ChatRequest {
        services::ChatRequest {
            message: self.message,
            conversation_history: self
                .conversation_history
                .into_iter()
                .map(|m| HistoryMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
            conversation_id: self.conversation_id,
            use_search: self.use_search,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Serialize)]
pub struct ConversationMessagesResponse {
    pub conversation_id: String,
    pub messages: Vec<StoredMessage>,
}

#[derive(Debug, Serialize)]
pub struct DeleteConversationResponse {
    pub success: bool,
    pub deleted_id: String,
}
