//! # Application Configuration
//!
//! Optional `pramuka.toml` holding the rule set and server settings.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [rules.track_a]
//! tier2_min_days = 90
//! ```
//!
//! A missing file yields the defaults. Server hardening (API key, rate limit,
//! CORS) is configured through environment variables, see [`crate::api`].

use pramuka_core::{PramukaError, RuleConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pramuka.toml";

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Everything read from `pramuka.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub rules: RuleConfig,
}

impl AppConfig {
    /// Load the configuration at `path`, or the defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, PramukaError> {
        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PramukaError::Storage(format!("Read config {:?}: {}", path, e)))?;
        let config = Self::parse(&contents)?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn parse(contents: &str) -> Result<Self, PramukaError> {
        let config: AppConfig = toml::from_str(contents)
            .map_err(|e| PramukaError::InvalidInput(format!("Invalid config: {}", e)))?;
        config.rules.validate()?;
        Ok(config)
    }
}

// =============================================================================
// TESTS
// =============================================================================
