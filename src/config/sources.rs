//! Source configuration loading.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::source::SourceConfig;

use super::validation::ConfigError;

/// A list of source configs, as it appears in YAML files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Configs to collect from.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl SourcesConfig {
    /// Merge another config into this one.
    #[must_use]
    pub fn merge(mut self, other: SourcesConfig) -> Self {
        self.sources.extend(other.sources);
        self
    }

    /// Validate the structural shape of the list.
    ///
    /// Whether a `type` is actually registered, and whether params are
    /// usable, is the registry's and each source's business at collection
    /// time; this only rejects shapes no source could accept.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for config in &self.sources {
            if config.source_type.is_empty() {
                return Err(ConfigError::ValidationError(
                    "source type cannot be empty".to_string(),
                ));
            }
            if config.name.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "source of type '{}' has an empty name",
                    config.source_type
                )));
            }
            if !seen.insert((&config.source_type, &config.name)) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate source config: '{}'",
                    config.identifier()
                )));
            }
            if config.max_retries == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "source '{}': max_retries must be at least 1",
                    config.identifier()
                )));
            }
        }

        Ok(())
    }

    /// Load and merge source configurations from all YAML files in a
    /// directory.
    pub fn load_from_dir(dir_path: &str) -> Result<Self, ConfigError> {
        let dir = Path::new(dir_path);
        if !dir.exists() {
            return Err(ConfigError::ValidationError(format!(
                "sources_path '{}' does not exist",
                dir_path
            )));
        }
        if !dir.is_dir() {
            return Err(ConfigError::ValidationError(format!(
                "sources_path '{}' is not a directory",
                dir_path
            )));
        }

        let mut merged = Self::default();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext != "yaml" && ext != "yml" {
                continue;
            }

            tracing::debug!("Loading source config from: {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let file_config: Self = serde_yaml::from_str(&content).map_err(|e| {
                ConfigError::ValidationError(format!("failed to parse '{}': {}", path.display(), e))
            })?;

            merged = merged.merge(file_config);
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_concatenates_lists() {
        let a = SourcesConfig {
            sources: vec![SourceConfig::new("git", "backend")],
        };
        let b = SourcesConfig {
            sources: vec![
                SourceConfig::new("git", "frontend"),
                SourceConfig::new("http-api", "ci"),
            ],
        };

        let merged = a.merge(b);
        assert_eq!(merged.sources.len(), 3);
    }

    #[test]
    fn test_validate_rejects_duplicate_type_name_pair() {
        let config = SourcesConfig {
            sources: vec![
                SourceConfig::new("git", "backend"),
                SourceConfig::new("git", "backend"),
            ],
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_allows_shared_type_distinct_names() {
        let config = SourcesConfig {
            sources: vec![
                SourceConfig::new("git", "backend"),
                SourceConfig::new("git", "frontend"),
            ],
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let config = SourcesConfig {
            sources: vec![SourceConfig::new("git", "")],
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty name"));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let config = SourcesConfig {
            sources: vec![SourceConfig::new("git", "backend").with_max_retries(0)],
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_retries"));
    }

    #[test]
    fn test_sources_yaml_roundtrip() {
        let yaml = r#"
sources:
  - type: git
    name: backend
    repo_path: /srv/repos/backend
    timeout: 2m
  - type: http-api
    name: issues
    enabled: false
    url: https://tracker.example.com/api/issues
    records_path: "$.issues[*]"
"#;

        let config: SourcesConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].timeout, Some(std::time::Duration::from_secs(120)));
        assert!(!config.sources[1].enabled);
        assert_eq!(
            config.sources[1].param_str("records_path"),
            Some("$.issues[*]")
        );
        assert!(config.validate().is_ok());
    }
}
