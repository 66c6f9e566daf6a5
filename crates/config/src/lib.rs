// Configuration Management
//
// This crate handles all configuration loading for the chat gateway.
// Everything is driven by environment variables: each provider or feature
// with a missing credential is simply removed from the active set instead
// of failing startup.

use thiserror::Error;

pub mod types;

// Re-export all configuration types
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    /// Load the full configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env().map_err(ConfigError::Invalid)?,
            logging: LoggingConfig::from_env().map_err(ConfigError::Invalid)?,
            providers: ProvidersConfig::from_env().map_err(ConfigError::Invalid)?,
            search: SearchConfig::from_env().map_err(ConfigError::Invalid)?,
            store: StoreConfig::from_env(),
            auth: AuthConfig::from_env(),
        })
    }
}
