//! Startup configuration, read from the environment once in main and
//! passed down. No other module reads environment variables.

use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MAPBOX_ACCESS_TOKEN is not set; the map cannot start without an access token")]
    MissingMapboxToken,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the radar API, e.g. http://localhost:8000
    pub api_base_url: String,
    /// Mapbox access token for basemap tiles
    pub mapbox_token: Option<String>,
    /// Refetch the radar feed every minute while the window is open
    pub auto_refresh: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            api_base_url: env::var("RADAR_API_URL")
                .unwrap_or_else(|_| radarapi::DEFAULT_BASE_URL.to_string()),
            mapbox_token: env::var("MAPBOX_ACCESS_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            auto_refresh: env::var("RADAR_AUTO_REFRESH")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Startup precondition for the map host. Without a token the host must
    /// never be constructed and the window shows the configuration screen.
    pub fn require_map_token(&self) -> Result<&str, ConfigError> {
        self.mapbox_token
            .as_deref()
            .ok_or(ConfigError::MissingMapboxToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_token(token: Option<&str>) -> AppConfig {
        AppConfig {
            api_base_url: radarapi::DEFAULT_BASE_URL.to_string(),
            mapbox_token: token.map(|t| t.to_string()),
            auto_refresh: false,
        }
    }

    #[test]
    fn test_missing_token_is_a_config_error() {
        let config = config_with_token(None);
        assert!(config.require_map_token().is_err());
    }

    #[test]
    fn test_present_token_passes() {
        let config = config_with_token(Some("pk.test123"));
        assert_eq!(config.require_map_token().unwrap(), "pk.test123");
    }
}
