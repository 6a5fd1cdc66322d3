use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub polling: PollingConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Learning backend the gateway talks to
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_token: Option<String>,
}

/// Local storage holding persisted flashcards
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub database_url: String,
}

/// Document registry polling
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    pub interval_secs: u64,
}

/// Local API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            backend: BackendConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            polling: PollingConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            backend_url = %self.backend.base_url,
            api_token = %self.backend.api_token.as_deref().map(mask_sensitive_data).unwrap_or_else(|| "<unset>".to_string()),
            database_url_masked = %mask_sensitive_data(&self.storage.database_url),
            poll_interval_secs = self.polling.interval_secs,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(anyhow!("LEARNING_API_URL must start with 'http://' or 'https://'"));
        }

        if !self.storage.database_url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.polling.interval_secs == 0 {
            return Err(anyhow!("POLL_INTERVAL_SECS must be greater than 0"));
        }

        if self.backend.api_token.as_deref().is_none_or(str::is_empty) {
            warn!("LEARNING_API_TOKEN is not set - backend calls will fail with 'Authentication required'");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().starts_with(level))
        {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl BackendConfig {
    fn from_env() -> Result<Self> {
        let base_url = env::var("LEARNING_API_URL")
            .unwrap_or_else(|_| "https://django-based-mcq-app.onrender.com".to_string());

        let api_token = env::var("LEARNING_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());

        Ok(BackendConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:study_session.db".to_string());

        Ok(StorageConfig { database_url })
    }
}

impl PollingConfig {
    fn from_env() -> Result<Self> {
        let raw = env::var("POLL_INTERVAL_SECS").unwrap_or_else(|_| "5".to_string());

        let interval_secs = raw
            .parse::<u64>()
            .map_err(|_| anyhow!("Invalid POLL_INTERVAL_SECS value: '{}'. Must be a whole number of seconds", raw))?;

        Ok(PollingConfig { interval_secs })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str)
        })?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,study_session=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

/// Mask sensitive data in configuration for safe logging
pub fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            backend: BackendConfig {
                base_url: "https://learning.example.com".to_string(),
                api_token: Some("token-123456789".to_string()),
            },
            storage: StorageConfig {
                database_url: "sqlite:test.db".to_string(),
            },
            polling: PollingConfig { interval_secs: 5 },
            server: ServerConfig {
                port: 3000,
                host: "127.0.0.1".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: false,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
        }
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:study_session.db"), "sqli***n.db");
        // Multi-byte characters at either end are kept whole
        assert_eq!(mask_sensitive_data("ñandú-secret-tökén"), "ñand***ökén");
        assert_eq!(mask_sensitive_data("日本語トークン"), "*******");
    }

    #[test]
    fn test_config_validation() {
        let config = sample_config();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.server.port = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.polling.interval_secs = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.backend.base_url = "ftp://learning.example.com".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.storage.database_url = "postgres://localhost/db".to_string();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_missing_token_is_only_a_warning() {
        let mut config = sample_config();
        config.backend.api_token = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poll_interval_duration() {
        let polling = PollingConfig { interval_secs: 5 };
        assert_eq!(polling.interval(), Duration::from_secs(5));
    }
}
