use crate::AppState;
use axum::{extract::State, http::StatusCode, response::Json as ResponseJson};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Detailed health status, reporting which features are active
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Providers with a configured credential
    pub providers: Vec<String>,
    pub search_enabled: bool,
    pub store_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Liveness endpoint
pub async fn root() -> (StatusCode, ResponseJson<RootResponse>) {
    (
        StatusCode::OK,
        ResponseJson(RootResponse {
            status: "healthy".to_string(),
            message: "chat gateway is running".to_string(),
            version: option_env!("CARGO_PKG_VERSION").map(|v| v.to_string()),
        }),
    )
}

/// Readiness endpoint: reports configured providers and features.
/// Requires no authentication; useful for monitors and load balancers.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, ResponseJson<HealthResponse>) {
    (
        StatusCode::OK,
        ResponseJson(HealthResponse {
            status: "healthy".to_string(),
            providers: state
                .registry
                .ids()
                .iter()
                .map(|id| id.to_string())
                .collect(),
            search_enabled: state.search_available,
            store_enabled: state.conversations.is_some(),
            version: option_env!("CARGO_PKG_VERSION").map(|v| v.to_string()),
        }),
    )
}
