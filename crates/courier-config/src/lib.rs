//! Courier Configuration System
//!
//! TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use courier_common::{AgentSettings, StatsSettings};

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agents: Vec<AgentSettings>,
    pub resource_profiles: Vec<ResourceProfileConfig>,
    pub statistics: StatsSettings,

    /// Enable development mode
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            resource_profiles: Vec::new(),
            statistics: StatsSettings::default(),
            dev_mode: false,
        }
    }
}

/// Resource profile definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceProfileConfig {
    pub id: String,
    /// Retry ratio at which admission is cut off entirely
    pub rate_limit_cutout_percentage: f64,
}

impl Default for ResourceProfileConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            rate_limit_cutout_percentage: 1.0,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject settings the agents would fail on at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for agent in &self.agents {
            if agent.channel_id.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "agent channel_id must not be empty".to_string(),
                ));
            }
        }

        let mut seen = HashSet::new();
        for profile in &self.resource_profiles {
            if profile.id.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "resource profile id must not be empty".to_string(),
                ));
            }
            if !seen.insert(profile.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate resource profile '{}'",
                    profile.id
                )));
            }
            if profile.rate_limit_cutout_percentage <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "resource profile '{}' needs a positive rate_limit_cutout_percentage",
                    profile.id
                )));
            }
        }

        if self.statistics.batch_size == 0 || self.statistics.history_length == 0 {
            return Err(ConfigError::ValidationError(
                "statistics batch_size and history_length must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Courier Configuration
# Environment variables override these settings

dev_mode = false

[statistics]
batch_size = 100
history_length = 20

[[resource_profiles]]
id = "documentdb"
rate_limit_cutout_percentage = 1.0

[[agents]]
channel_id = "orders"
capabilities = "Bidirectional"
sender_default_priority = 0
resource_profiles = ["documentdb"]

[[agents.listener_partitions]]
priority = 1
priority_weighting = 1.5

[[agents.listener_partitions]]
priority = 0

[[agents.sender_partitions]]
priority = 1

[[agents.sender_partitions]]
priority = 0
"#
        .to_string()
    }
}
