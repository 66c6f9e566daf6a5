use crate::{
    middleware::AuthenticatedUser,
    models::{
        ConversationListResponse, ConversationMessagesResponse, DeleteConversationResponse,
        ErrorResponse,
    },
    AppState,
};
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json as ResponseJson,
};
use services::ConversationGateway;
use std::sync::Arc;
use tracing::{debug, info};

type ApiError = (StatusCode, ResponseJson<ErrorResponse>);

fn require_store(state: &AppState) -> Result<Arc<ConversationGateway>, ApiError> {
    state.conversations.clone().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        ResponseJson(ErrorResponse::new(
            "conversation store is not configured",
            "store_unavailable",
        )),
    ))
}

fn internal_error(error: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ResponseJson(ErrorResponse::new(
            error.to_string(),
            "internal_server_error",
        )),
    )
}

/// List the caller's most recently updated conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<ResponseJson<ConversationListResponse>, ApiError> {
    debug!(user = %user.0.uid, "list conversations");
    let gateway = require_store(&state)?;

    let conversations = gateway
        .list(&user.0.uid)
        .await
        .map_err(internal_error)?;
    Ok(ResponseJson(ConversationListResponse { conversations }))
}

/// Ordered message list for one conversation
pub async fn get_conversation_messages(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<ResponseJson<ConversationMessagesResponse>, ApiError> {
    debug!(user = %user.0.uid, conversation_id, "get conversation messages");
    let gateway = require_store(&state)?;

    let messages = gateway
        .messages(&user.0.uid, &conversation_id)
        .await
        .map_err(internal_error)?;
    Ok(ResponseJson(ConversationMessagesResponse {
        conversation_id,
        messages,
    }))
}

/// Delete a conversation and all of its messages
pub async fn delete_conversation(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<ResponseJson<DeleteConversationResponse>, ApiError> {
    let gateway = require_store(&state)?;

    gateway
        .delete(&user.0.uid, &conversation_id)
        .await
        .map_err(internal_error)?;

    info!(user = %user.0.uid, conversation_id, "deleted conversation");
    Ok(ResponseJson(DeleteConversationResponse {
        success: true,
        deleted_id: conversation_id,
    }))
}
