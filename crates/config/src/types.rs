use std::{collections::HashMap, env};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub providers: ProvidersConfig,
    pub search: SearchConfig,
    pub store: Option<StoreConfig>,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| "SERVER_PORT must be a valid port number".to_string())?,
        })
    }
}

/// Logging Configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub modules: HashMap<String, String>,
}

impl LoggingConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mut modules = HashMap::new();

        // Load module-specific log levels
        if let Ok(level) = env::var("LOG_MODULE_API") {
            modules.insert("api".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_SERVICES") {
            modules.insert("services".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_PROVIDERS") {
            modules.insert("providers".to_string(), level);
        }

        Ok(Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            modules,
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            modules: HashMap::new(),
        }
    }
}

/// Credentials and endpoint for one upstream chat provider.
///
/// A provider is active when its API key is present in the environment;
/// base URL and model name have sensible defaults per provider.
#[derive(Debug, Clone)]
pub struct ProviderKeyConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl ProviderKeyConfig {
    fn from_env(prefix: &str, default_base_url: &str, default_model: &str) -> Option<Self> {
        let api_key = env::var(format!("{prefix}_API_KEY")).ok()?;
        if api_key.is_empty() {
            return None;
        }
        Some(Self {
            api_key,
            base_url: env::var(format!("{prefix}_BASE_URL"))
                .unwrap_or_else(|_| default_base_url.to_string()),
            model: env::var(format!("{prefix}_MODEL"))
                .unwrap_or_else(|_| default_model.to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub grok: Option<ProviderKeyConfig>,
    pub openai: Option<ProviderKeyConfig>,
    pub gemini: Option<ProviderKeyConfig>,
    /// Client-side deadline for non-streaming completion calls, in seconds
    pub chat_timeout_secs: u64,
}

impl ProvidersConfig {
    /// Load from environment variables.
    ///
    /// Each provider whose key is absent is dropped from the active set.
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            grok: ProviderKeyConfig::from_env("GROK", "https://api.x.ai/v1", "grok-3"),
            openai: ProviderKeyConfig::from_env("OPENAI", "https://api.openai.com/v1", "gpt-4o"),
            gemini: ProviderKeyConfig::from_env(
                "GEMINI",
                "https://generativelanguage.googleapis.com/v1beta",
                "gemini-2.0-flash",
            ),
            chat_timeout_secs: env::var("CHAT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| "CHAT_TIMEOUT_SECS must be a valid number".to_string())?,
        })
    }

    pub fn any_configured(&self) -> bool {
        self.grok.is_some() || self.openai.is_some() || self.gemini.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// API key for the ranked (paid) search engine
    pub brave_api_key: Option<String>,
    /// Whether the keyless fallback engine is enabled
    pub duckduckgo_enabled: bool,
    /// Maximum agent <-> tool round-trips before forcing a final answer
    pub max_agent_turns: usize,
}

impl SearchConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            brave_api_key: env::var("BRAVE_SEARCH_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            duckduckgo_enabled: env::var("SEARCH_DUCKDUCKGO_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| "SEARCH_DUCKDUCKGO_ENABLED must be true or false".to_string())?,
            max_agent_turns: env::var("SEARCH_MAX_AGENT_TURNS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| "SEARCH_MAX_AGENT_TURNS must be a valid number".to_string())?,
        })
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            brave_api_key: None,
            duckduckgo_enabled: true,
            max_agent_turns: 5,
        }
    }
}

/// Document store configuration.
///
/// When absent, conversation persistence is disabled and chat responses
/// carry no conversation id.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub project_id: String,
    pub access_token: String,
    pub base_url: String,
}

impl StoreConfig {
    /// Load from environment variables; `None` when the store is not configured
    pub fn from_env() -> Option<Self> {
        let project_id = env::var("STORE_PROJECT_ID").ok().filter(|v| !v.is_empty())?;
        let access_token = env::var("STORE_ACCESS_TOKEN").ok().filter(|v| !v.is_empty())?;
        Some(Self {
            project_id,
            access_token,
            base_url: env::var("STORE_BASE_URL")
                .unwrap_or_else(|_| "https://firestore.googleapis.com/v1".to_string()),
        })
    }
}

/// Authentication configuration.
///
/// When no verification endpoint is configured, authentication is disabled
/// and requests are served with anonymous claims.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub verify_url: Option<String>,
}

impl AuthConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        Self {
            verify_url: env::var("AUTH_VERIFY_URL").ok().filter(|v| !v.is_empty()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.verify_url.is_some()
    }
}
