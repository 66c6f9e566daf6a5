//! End-to-end route tests over the assembled router, with a mock backend
//! and an in-memory store standing in for the external collaborators.

use api::middleware::AuthState;
use api::{build_router, AppState};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use providers::{ChatBackend, ChatOutcome, MockBackend, MockReply, ProviderId, ProviderRegistry};
use serde_json::{json, Value};
use services::{
    ChatService, ConversationGateway, MockVerifier, SearchAgent, SearchRouter, UserClaims,
};
use std::sync::Arc;
use store::{DocumentStore, MemoryStore};
use tower::ServiceExt;

fn test_state(
    backends: Vec<Arc<dyn ChatBackend>>,
    store: Option<Arc<MemoryStore>>,
) -> AppState {
    let registry = Arc::new(ProviderRegistry::new(backends));
    let agent = Arc::new(SearchAgent::new(
        registry.clone(),
        Arc::new(SearchRouter::new(vec![])),
        5,
    ));
    let conversations = store.map(|s| {
        Arc::new(ConversationGateway::new(s as Arc<dyn DocumentStore>))
    });
    let chat_service = Arc::new(ChatService::new(
        registry.clone(),
        agent,
        conversations.clone(),
    ));
    AppState {
        registry,
        chat_service,
        conversations,
        search_available: false,
    }
}

fn app_with(backends: Vec<Arc<dyn ChatBackend>>, store: Option<Arc<MemoryStore>>) -> Router {
    build_router(test_state(backends, store), AuthState::disabled())
}

fn grok_answering(text: &str) -> Arc<dyn ChatBackend> {
    Arc::new(MockBackend::with_reply(
        ProviderId::Grok,
        MockReply::Complete(ChatOutcome {
            text: text.to_string(),
            reasoning: None,
            tool_calls: vec![],
        }),
    ))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_health_reports_configured_providers() {
    let app = app_with(vec![grok_answering("x")], None);

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["providers"], json!(["grok"]));
    assert_eq!(body["store_enabled"], false);
}

#[tokio::test]
async fn test_chat_happy_path() {
    let app = app_with(vec![grok_answering("Diabetes is...")], None);

    let request = json_request(
        "POST",
        "/api/chat",
        json!({"message": "What is diabetes?", "conversation_history": []}),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["response"], "Diabetes is...");
    assert_eq!(body["provider"], "grok");
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let app = app_with(vec![grok_answering("x")], None);

    let request = json_request("POST", "/api/chat", json!({"message": "  "}));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_without_providers_is_server_error() {
    let app = app_with(vec![], None);

    let request = json_request("POST", "/api/chat", json!({"message": "hi"}));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["type"], "no_provider_configured");
}

#[tokio::test]
async fn test_conversations_unavailable_without_store() {
    let app = app_with(vec![grok_answering("x")], None);

    let response = app.oneshot(get_request("/api/conversations")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_conversation_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let app = app_with(vec![grok_answering("An answer.")], Some(store));

    // One chat exchange creates a conversation with two messages
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/chat",
            json!({"message": "What is diabetes?"}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    let conversation_id = body["conversation_id"].as_str().unwrap().to_string();
    settle().await;

    let response = app
        .clone()
        .oneshot(get_request("/api/conversations"))
        .await
        .unwrap();
    let body = body_json(response).await;
    let conversations = body["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["id"], conversation_id.as_str());
    assert_eq!(conversations[0]["title"], "What is diabetes?");
    assert_eq!(conversations[0]["message_count"], 2);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/conversations/{conversation_id}")))
        .await
        .unwrap();
    let body = body_json(response).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/conversations/{conversation_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["success"], true);

    let response = app.oneshot(get_request("/api/conversations")).await.unwrap();
    let body = body_json(response).await;
    assert!(body["conversations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_auth_required_when_enabled() {
    let claims = UserClaims {
        uid: "user-1".to_string(),
        email: Some("user@example.com".to_string()),
        name: None,
        email_verified: true,
    };
    let auth = AuthState::enabled(Arc::new(MockVerifier::new("good-token", claims)));
    let app = build_router(test_state(vec![grok_answering("ok")], None), auth);

    // No token
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/chat", json!({"message": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong token
    let mut request = json_request("POST", "/api/chat", json!({"message": "hi"}));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer bad-token".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Valid token
    let mut request = json_request("POST", "/api/chat", json!({"message": "hi"}));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer good-token".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Health stays open
}

#[tokio::test]
async fn test_health_open_without_token() {
    let claims = UserClaims {
        uid: "user-1".to_string(),
        email: None,
        name: None,
        email_verified: false,
    };
    let auth = AuthState::enabled(Arc::new(MockVerifier::new("t", claims)));
    let app = build_router(test_state(vec![grok_answering("ok")], None), auth);

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_stream_endpoint_emits_event_sequence() {
    let app = app_with(vec![grok_answering("Hello world")], None);

    let request = json_request("POST", "/api/chat/stream", json!({"message": "hi"}));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(
        response.headers().get("x-accel-buffering").unwrap(),
        "no"
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|payload| serde_json::from_str(payload).ok())
        .collect();

    assert_eq!(events.first().unwrap()["type"], "provider");
    assert_eq!(events.first().unwrap()["provider"], "grok");
    let content: String = events
        .iter()
        .filter(|e| e["type"] == "content")
        .filter_map(|e| e["data"].as_str())
        .collect();
    assert_eq!(content, "Hello world");
    let last = events.last().unwrap();
    assert_eq!(last["type"], "done");
    assert_eq!(last["done"], true);
}
