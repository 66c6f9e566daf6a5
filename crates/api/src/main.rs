use config::{AppConfig, LoggingConfig};

#[tokio::main]
async fn main() {
    let app_config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });

    init_tracing(&app_config.logging);

    let state = api::init_state(&app_config);
    let auth = api::init_auth(&app_config);

    let providers: Vec<_> = state.registry.ids().iter().map(|p| p.to_string()).collect();
    tracing::info!(providers = ?providers, "active chat providers");

    let app = api::build_router(state, auth);

    let bind_address = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(address = %bind_address, error = %e, "failed to bind");
            std::process::exit(1);
        });

    tracing::info!(address = %bind_address, "Server started successfully");
    tracing::info!("API Endpoints:");
    tracing::info!("  - POST /api/chat (Chat)");
    tracing::info!("  - POST /api/chat/stream (Streaming chat)");
    tracing::info!("  - GET /api/conversations (List conversations)");
    tracing::info!("  - GET /api/conversations/{{id}} (Conversation messages)");
    tracing::info!("  - DELETE /api/conversations/{{id}} (Delete conversation)");

    axum::serve(listener, app).await.unwrap();
}

fn init_tracing(logging_config: &LoggingConfig) {
    // Build the filter string from the logging configuration
    let mut filter = logging_config.level.clone();
    for (module, level) in &logging_config.modules {
        filter.push_str(&format!(",{module}={level}"));
    }

    match logging_config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
    }
}
