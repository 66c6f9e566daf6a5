pub mod middleware;
pub mod models;
pub mod routes;

use crate::middleware::{auth_middleware, AuthState};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use config::AppConfig;
use providers::{
    BackendConfig, ChatBackend, GeminiBackend, GrokBackend, OpenAiBackend, ProviderRegistry,
};
use services::{
    ChatService, ConversationGateway, RemoteTokenVerifier, SearchAgent, SearchRouter,
};
use std::sync::Arc;
use store::{DocumentStore, FirestoreStore};
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub chat_service: Arc<ChatService>,
    pub conversations: Option<Arc<ConversationGateway>>,
    pub search_available: bool,
}

fn backend_config(provider: &config::ProviderKeyConfig, timeout_secs: u64) -> BackendConfig {
    BackendConfig {
        base_url: provider.base_url.clone(),
        api_key: provider.api_key.clone(),
        model: provider.model.clone(),
        timeout_secs,
    }
}

/// Build the provider registry from whatever credentials are configured.
/// Providers with missing keys are simply absent; an empty registry is
/// valid at startup but fails chat requests.
pub fn init_providers(config: &config::ProvidersConfig) -> Arc<ProviderRegistry> {
    let mut backends: Vec<Arc<dyn ChatBackend>> = Vec::new();

    if let Some(provider) = &config.grok {
        tracing::info!(model = %provider.model, "grok provider configured");
        backends.push(Arc::new(GrokBackend::new(backend_config(
            provider,
            config.chat_timeout_secs,
        ))));
    }
    if let Some(provider) = &config.openai {
        tracing::info!(model = %provider.model, "openai provider configured");
        backends.push(Arc::new(OpenAiBackend::new(backend_config(
            provider,
            config.chat_timeout_secs,
        ))));
    }
    if let Some(provider) = &config.gemini {
        tracing::info!(model = %provider.model, "gemini provider configured");
        backends.push(Arc::new(GeminiBackend::new(backend_config(
            provider,
            config.chat_timeout_secs,
        ))));
    }

    if backends.is_empty() {
        tracing::warn!("no chat provider configured; chat endpoints will return errors");
    }

    Arc::new(ProviderRegistry::new(backends))
}

/// Wire up the full service graph from configuration
pub fn init_state(config: &AppConfig) -> AppState {
    let registry = init_providers(&config.providers);

    let search_router = Arc::new(SearchRouter::from_config(&config.search));
    let search_available = search_router.has_engine();
    let agent = Arc::new(SearchAgent::new(
        registry.clone(),
        search_router,
        config.search.max_agent_turns,
    ));

    let conversations = config.store.as_ref().map(|store_config| {
        tracing::info!(project = %store_config.project_id, "conversation store configured");
        let store = Arc::new(FirestoreStore::new(
            store_config.base_url.clone(),
            store_config.project_id.clone(),
            store_config.access_token.clone(),
        )) as Arc<dyn DocumentStore>;
        Arc::new(ConversationGateway::new(store))
    });
    if conversations.is_none() {
        tracing::warn!("conversation store not configured; persistence disabled");
    }

    let chat_service = Arc::new(ChatService::new(
        registry.clone(),
        agent,
        conversations.clone(),
    ));

    AppState {
        registry,
        chat_service,
        conversations,
        search_available,
    }
}

pub fn init_auth(config: &AppConfig) -> AuthState {
    match &config.auth.verify_url {
        Some(url) => {
            tracing::info!("authentication enabled");
            AuthState::enabled(Arc::new(RemoteTokenVerifier::new(url.clone())))
        }
        None => {
            tracing::warn!("authentication disabled; requests are served anonymously");
            AuthState::disabled()
        }
    }
}

/// Assemble the application router. Health endpoints are open; everything
/// under `/api` goes through the auth middleware.
pub fn build_router(state: AppState, auth: AuthState) -> Router {
    let api_routes = Router::new()
        .route("/chat", post(routes::chat::chat))
        .route("/chat/stream", post(routes::chat::chat_stream))
        .route(
            "/conversations",
            get(routes::conversations::list_conversations),
        )
        .route(
            "/conversations/{conversation_id}",
            get(routes::conversations::get_conversation_messages)
                .delete(routes::conversations::delete_conversation),
        )
        .route_layer(from_fn_with_state(auth, auth_middleware));

    Router::new()
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
