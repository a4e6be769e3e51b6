//! Application configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

/// Development default values - NEVER use in production.
pub mod defaults {
    pub const DEV_API_BASE_URL: &str = "http://127.0.0.1:8080/api";
    pub const DEV_CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const DEV_PROGRESS_TICK_MS: u64 = 1_000; // Fallback progress advances once per second
    pub const DEV_SUCCESS_DISPLAY_MS: u64 = 500; // Hold "complete" before navigating
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse environment from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Check if this is a development environment.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Check if this is a production environment.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime environment
    pub environment: Environment,
    /// Base URL of the hospital information system REST API
    pub api_base_url: String,
    /// Bearer token attached to every API request
    pub api_token: Option<SecretString>,
    /// TCP connect timeout. There is no total request timeout.
    pub connect_timeout_secs: u64,
    /// Fallback progress tick interval in milliseconds
    pub progress_tick_ms: u64,
    /// How long the completed state is shown before navigating, in milliseconds
    pub success_display_ms: u64,
    /// Base URL used to resolve relative viewer links returned by the server
    pub viewer_base_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In development mode (RUST_ENV=development):
    /// - All variables have sensible defaults
    /// - Only RUST_ENV is required
    ///
    /// In production mode (RUST_ENV=production):
    /// - DSU_API_BASE_URL must be an https URL
    /// - DSU_API_TOKEN is required
    ///
    /// Environment variables:
    /// - `RUST_ENV`: Environment (development/production) - REQUIRED
    /// - `DSU_API_BASE_URL`: API base URL (default: http://127.0.0.1:8080/api)
    /// - `DSU_API_TOKEN`: Bearer token for the API
    /// - `DSU_CONNECT_TIMEOUT_SECS`: Connect timeout in seconds (default: 10)
    /// - `DSU_PROGRESS_TICK_MS`: Fallback progress tick in milliseconds (default: 1000)
    /// - `DSU_SUCCESS_DISPLAY_MS`: Completed-state hold in milliseconds (default: 500)
    /// - `DSU_VIEWER_BASE_URL`: Base for relative viewer URLs (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Parse environment - required
        let env_str = env::var("RUST_ENV").map_err(|_| ConfigError::MissingEnvVar("RUST_ENV"))?;

        let environment = Environment::parse(&env_str).ok_or(ConfigError::InvalidValue(
            "RUST_ENV must be 'development' or 'production'",
        ))?;

        let api_base_url = env::var("DSU_API_BASE_URL")
            .unwrap_or_else(|_| defaults::DEV_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let api_token = env::var("DSU_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);

        let connect_timeout_secs = env::var("DSU_CONNECT_TIMEOUT_SECS")
            .unwrap_or_else(|_| defaults::DEV_CONNECT_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue("DSU_CONNECT_TIMEOUT_SECS must be a valid number")
            })?;

        let progress_tick_ms = env::var("DSU_PROGRESS_TICK_MS")
            .unwrap_or_else(|_| defaults::DEV_PROGRESS_TICK_MS.to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue("DSU_PROGRESS_TICK_MS must be a valid number"))?;

        if progress_tick_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "DSU_PROGRESS_TICK_MS must be greater than zero",
            ));
        }

        let success_display_ms = env::var("DSU_SUCCESS_DISPLAY_MS")
            .unwrap_or_else(|_| defaults::DEV_SUCCESS_DISPLAY_MS.to_string())
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue("DSU_SUCCESS_DISPLAY_MS must be a valid number")
            })?;

        let viewer_base_url = env::var("DSU_VIEWER_BASE_URL")
            .ok()
            .map(|u| u.trim_end_matches('/').to_string());

        let config = Config {
            environment,
            api_base_url,
            api_token,
            connect_timeout_secs,
            progress_tick_ms,
            success_display_ms,
            viewer_base_url,
        };

        // Validate production configuration
        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    /// Validate that production configuration does not use development defaults.
    fn validate_production(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.api_base_url == defaults::DEV_API_BASE_URL {
            errors.push(format!(
                "DSU_API_BASE_URL is using development default '{}'. Set the production API URL.",
                defaults::DEV_API_BASE_URL
            ));
        } else if !self.api_base_url.starts_with("https://") {
            errors.push("DSU_API_BASE_URL must use https in production.".to_string());
        }

        match self.api_token {
            Some(ref token) if !token.expose_secret().is_empty() => {}
            _ => errors.push("DSU_API_TOKEN must be set in production.".to_string()),
        }

        if !errors.is_empty() {
            return Err(ConfigError::ProductionValidation(errors));
        }

        Ok(())
    }

    /// Connect timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Check if running in development mode.
    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Production configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    ProductionValidation(Vec<String>),
}
