//! Configuration types for the dashboard session

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{DashboardError, Result};
use crate::readings::READING_LIMIT;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

/// Backend gateway connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Project the session belongs to. Must be supplied; there is no
    /// usable default.
    #[serde(default)]
    pub project_id: String,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

/// Sign-in settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Pre-issued credential token. When absent the session signs in
    /// anonymously.
    #[serde(default)]
    pub credential_token: Option<String>,
}

/// Live query settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            project_id: String::new(),
            connection_timeout_seconds: default_connection_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            limit: default_limit(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    4800
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_collection() -> String {
    "sensorReadings".to_string()
}

fn default_limit() -> usize {
    READING_LIMIT
}

impl Config {
    /// Check that the configuration is complete enough to start a session.
    ///
    /// An absent or empty backend configuration is a terminal error: the
    /// session never opens a connection and surfaces the error instead.
    pub fn validate(&self) -> Result<()> {
        if self.backend.host.trim().is_empty() || self.backend.project_id.trim().is_empty() {
            return Err(DashboardError::MissingConfiguration);
        }
        if self.query.collection.trim().is_empty() {
            return Err(DashboardError::InvalidConfiguration(
                "query collection must not be empty".to_string(),
            ));
        }
        if self.query.limit == 0 {
            return Err(DashboardError::InvalidConfiguration(
                "query limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &PathBuf) -> std::result::Result<Config, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
