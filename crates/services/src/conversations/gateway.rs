//! Conversation lifecycle over the document store.
//!
//! Conversations live in a two-level hierarchy: a metadata document at
//! `users/{uid}/conversations/{cid}` and its messages in a `messages`
//! subcollection underneath. Counter updates go through the store's atomic
//! increment so concurrent appends to one conversation never race.

use crate::conversations::models::{Conversation, StoredMessage};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use store::{DocumentStore, StoreError};
use thiserror::Error;

/// Conversations shown per listing request
const MAX_LISTED_CONVERSATIONS: usize = 50;
/// Messages fetched per conversation
const MAX_FETCHED_MESSAGES: usize = 1000;
/// Title is derived from the first message, truncated at this many chars
const TITLE_MAX_CHARS: usize = 50;
/// Preview of the most recent message kept on the conversation document
const PREVIEW_MAX_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct ConversationGateway {
    store: Arc<dyn DocumentStore>,
}

impl ConversationGateway {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn conversations_path(user_id: &str) -> String {
        format!("users/{user_id}/conversations")
    }

    fn conversation_path(user_id: &str, conversation_id: &str) -> String {
        format!("users/{user_id}/conversations/{conversation_id}")
    }

    fn messages_path(user_id: &str, conversation_id: &str) -> String {
        format!("users/{user_id}/conversations/{conversation_id}/messages")
    }

    /// Create a new conversation keyed off its first message
    pub async fn create(
        &self,
        user_id: &str,
        first_message: &str,
    ) -> Result<Conversation, ConversationError> {
        let now = Utc::now().to_rfc3339();
        let title = derive_title(first_message);
        let last_message = preview(first_message);

        let doc = json!({
            "title": title,
            "last_message": last_message,
            "message_count": 0,
            "created_at": now,
            "last_updated": now,
        });
        let id = self
            .store
            .create(&Self::conversations_path(user_id), doc)
            .await?;

        tracing::info!(conversation_id = %id, user_id, "created conversation");

        Ok(Conversation {
            id,
            title,
            last_message,
            message_count: 0,
            created_at: now.clone(),
            last_updated: now,
        })
    }

    /// Resolve the conversation id for a request: reuse the caller-supplied
    /// id as-is, or create a new conversation from the first message. An
    /// explicit id never creates a new conversation.
    pub async fn ensure(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        first_message: &str,
    ) -> Result<String, ConversationError> {
        match conversation_id {
            Some(id) => Ok(id.to_string()),
            None => Ok(self.create(user_id, first_message).await?.id),
        }
    }

    /// Append one message and refresh the conversation metadata
    pub async fn append_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        message: StoredMessage,
    ) -> Result<(), ConversationError> {
        let conversation_path = Self::conversation_path(user_id, conversation_id);
        let metadata = json!({
            "last_message": preview(&message.content),
            "last_updated": message.timestamp,
        });
        let doc = serde_json::to_value(&message)?;

        self.store
            .create(&Self::messages_path(user_id, conversation_id), doc)
            .await?;
        self.store.set_merge(&conversation_path, metadata).await?;
        self.store
            .increment(&conversation_path, "message_count", 1)
            .await?;
        Ok(())
    }

    /// Most recently updated conversations for one user, newest first
    pub async fn list(&self, user_id: &str) -> Result<Vec<Conversation>, ConversationError> {
        let documents = self
            .store
            .list(
                &Self::conversations_path(user_id),
                "last_updated",
                true,
                MAX_LISTED_CONVERSATIONS,
            )
            .await?;

        let mut conversations = Vec::with_capacity(documents.len());
        for doc in documents {
            let mut fields = doc.fields;
            if let Some(object) = fields.as_object_mut() {
                object.insert("id".to_string(), json!(doc.id));
            }
            match serde_json::from_value::<Conversation>(fields) {
                Ok(conversation) => conversations.push(conversation),
                Err(e) => {
                    tracing::warn!(conversation_id = %doc.id, error = %e, "skipping malformed conversation document")
                }
            }
        }
        Ok(conversations)
    }

    /// Ordered message list for one conversation, oldest first
    pub async fn messages(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, ConversationError> {
        let documents = self
            .store
            .list(
                &Self::messages_path(user_id, conversation_id),
                "timestamp",
                false,
                MAX_FETCHED_MESSAGES,
            )
            .await?;

        let mut messages = Vec::with_capacity(documents.len());
        for doc in documents {
            match serde_json::from_value::<StoredMessage>(doc.fields) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(message_id = %doc.id, error = %e, "skipping malformed message document")
                }
            }
        }
        Ok(messages)
    }

    /// Delete a conversation and all of its child messages
    pub async fn delete(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<(), ConversationError> {
        let messages_path = Self::messages_path(user_id, conversation_id);
        let children = self
            .store
            .list(&messages_path, "timestamp", false, MAX_FETCHED_MESSAGES)
            .await?;
        for child in children {
            self.store
                .delete(&format!("{messages_path}/{}", child.id))
                .await?;
        }
        self.store
            .delete(&Self::conversation_path(user_id, conversation_id))
            .await?;

        tracing::info!(conversation_id, user_id, "deleted conversation");
        Ok(())
    }
}

fn derive_title(first_message: &str) -> String {
    let mut title: String = first_message.chars().take(TITLE_MAX_CHARS).collect();
    if first_message.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_MAX_CHARS).collect()
}
