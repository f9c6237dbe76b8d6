//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{
    CollectOptions, DEFAULT_GLOBAL_TIMEOUT, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RETRIES,
    DEFAULT_SOURCE_TIMEOUT,
};
use crate::source::SourceConfig;

use super::sources::SourcesConfig;
use super::validation::ConfigError;

/// Collection defaults applied when a call or a config does not override
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionDefaults {
    /// Fan out concurrently (default: true).
    pub concurrent: bool,

    /// Collections allowed in flight at once (default: 3).
    pub max_concurrency: usize,

    /// Recover per-source failures instead of aborting (default: true).
    pub continue_on_error: bool,

    /// Ceiling on one whole batch (default: 5m).
    #[serde(with = "humantime_serde")]
    pub global_timeout: Duration,

    /// Per-attempt timeout for sources that set none (default: 1m).
    #[serde(with = "humantime_serde")]
    pub source_timeout: Duration,

    /// Attempt budget for sources that set none (default: 3).
    pub max_retries: u32,
}

impl Default for CollectionDefaults {
    fn default() -> Self {
        Self {
            concurrent: true,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            continue_on_error: true,
            global_timeout: DEFAULT_GLOBAL_TIMEOUT,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl CollectionDefaults {
    /// Build per-call options from these defaults.
    pub fn to_options(&self) -> CollectOptions {
        CollectOptions::default()
            .with_concurrent(self.concurrent)
            .with_max_concurrency(self.max_concurrency)
            .with_continue_on_error(self.continue_on_error)
            .with_global_timeout(self.global_timeout)
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Collection defaults.
    #[serde(default)]
    pub collection: CollectionDefaults,

    /// Inline source configs.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Path to a directory with additional source config files.
    #[serde(default)]
    pub sources_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, merging in any `sources_path` directory.
    pub fn load_with_sources_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;

        if let Some(ref sources_dir) = config.sources_path {
            let additional = SourcesConfig::load_from_dir(sources_dir)?;
            config.sources.extend(additional.sources);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "collection max_concurrency must be positive".to_string(),
            ));
        }
        if self.collection.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "collection max_retries must be at least 1".to_string(),
            ));
        }

        SourcesConfig {
            sources: self.sources.clone(),
        }
        .validate()
    }
}
