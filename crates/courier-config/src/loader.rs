//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "courier.toml",
    "config.toml",
    "./config/courier.toml",
    "/etc/courier/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!(?path, "Configured file not found, searching standard paths");
        }

        if let Ok(path) = env::var("COURIER_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) {
        if let Ok(val) = env::var("COURIER_STATS_BATCH_SIZE") {
            if let Ok(size) = val.parse() {
                config.statistics.batch_size = size;
            }
        }
        if let Ok(val) = env::var("COURIER_STATS_HISTORY_LENGTH") {
            if let Ok(length) = val.parse() {
                config.statistics.history_length = length;
            }
        }

        // Applies to every profile
        if let Ok(val) = env::var("COURIER_RATE_LIMIT_CUTOUT") {
            if let Ok(cutout) = val.parse::<f64>() {
                for profile in &mut config.resource_profiles {
                    profile.rate_limit_cutout_percentage = cutout;
                }
            }
        }

        if let Ok(val) = env::var("COURIER_DEV_MODE") {
            config.dev_mode = val == "true" || val == "1";
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[statistics]
batch_size = 5
history_length = 3

[[agents]]
channel_id = "billing"
capabilities = "Sender"
"#
        )
        .unwrap();

        let config = ConfigLoader::with_path(file.path()).load().unwrap();

        assert_eq!(config.statistics.batch_size, 5);
        assert_eq!(config.statistics.history_length, 3);
        assert_eq!(config.agents[0].channel_id, "billing");
        // Partition lists fall back to defaults when omitted
        assert_eq!(config.agents[0].sender_partitions.len(), 1);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "agents = 12").unwrap();

        let result = ConfigLoader::with_path(file.path()).load();
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
