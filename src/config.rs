//! Application configuration loaded from environment variables.
//!
//! All settings have sensible local-development defaults except the
//! Immich connection, which is optional: import endpoints report
//! "not configured" when it is absent.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// SQLite database path
    pub database_path: String,
    /// User ID assigned to samples that arrive without one
    pub default_user: String,
    /// Immich server base URL (optional)
    pub immich_url: Option<String>,
    /// Immich API key (optional)
    pub immich_api_key: Option<String>,
    /// Whether to reverse-geocode timeline stops through Nominatim
    pub geocoding_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./data/whence.db".to_string()),
            default_user: env::var("DEFAULT_USER").unwrap_or_else(|_| "default".to_string()),
            immich_url: env::var("IMMICH_URL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            immich_api_key: env::var("IMMICH_API_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            geocoding_enabled: env::var("GEOCODING_ENABLED")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        })
    }

    /// True when both Immich settings are present.
    pub fn immich_configured(&self) -> bool {
        self.immich_url.is_some() && self.immich_api_key.is_some()
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            database_path: ":memory:".to_string(),
            default_user: "default".to_string(),
            immich_url: None,
            immich_api_key: None,
            geocoding_enabled: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
