use crate::{
    middleware::AuthenticatedUser,
    models::{ChatRequestBody, ErrorResponse},
    AppState,
};
use axum::{
    extract::{Extension, Json, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json as ResponseJson, Response,
    },
};
use futures::StreamExt;
use services::ChatError;
use std::convert::Infallible;
use tracing::debug;

/// Non-streaming chat endpoint.
///
/// Upstream failures come back as a 200 with `success: false`; only the
/// no-provider condition is an HTTP-level error.
pub async fn chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<ChatRequestBody>,
) -> Response {
    debug!(user = %user.0.uid, use_search = body.use_search, "chat request");

    if let Err(error) = body.validate() {
        return (
            StatusCode::BAD_REQUEST,
            ResponseJson(ErrorResponse::new(error, "invalid_request_error")),
        )
            .into_response();
    }

    match state.chat_service.chat(body.into_request(), &user.0.uid).await {
        Ok(response) => (StatusCode::OK, ResponseJson(response)).into_response(),
        Err(error @ ChatError::NoProviderConfigured) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ResponseJson(ErrorResponse::new(
                error.to_string(),
                "no_provider_configured",
            )),
        )
            .into_response(),
    }
}

/// Streaming chat endpoint.
///
/// Emits a `text/event-stream` of JSON-encoded stream events, one per
/// `data: ` line, with caching and proxy buffering disabled.
pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<ChatRequestBody>,
) -> Response {
    debug!(user = %user.0.uid, use_search = body.use_search, "chat stream request");

    if let Err(error) = body.validate() {
        return (
            StatusCode::BAD_REQUEST,
            ResponseJson(ErrorResponse::new(error, "invalid_request_error")),
        )
            .into_response();
    }

    let events = state
        .chat_service
        .chat_stream(body.into_request(), &user.0.uid)
        .map(|event| {
            Ok::<_, Infallible>(
                Event::default().data(serde_json::to_string(&event).unwrap_or_default()),
            )
        });

    let mut response = Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(15))
                .text("keep-alive"),
        )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    response
}
