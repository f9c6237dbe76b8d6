//! Core data-source traits and types.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Time bucketing tag carried alongside a collection window.
///
/// The engine does not interpret the granularity itself; it is passed through
/// to sources and into the report summary so downstream analytics can group
/// records consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(format!("unknown granularity '{}'", other)),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
        }
    }
}

/// Collection window, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Window start (inclusive).
    pub start: DateTime<Utc>,
    /// Window end (inclusive).
    pub end: DateTime<Utc>,
    /// Bucketing tag for downstream grouping.
    #[serde(default)]
    pub granularity: Granularity,
}

impl TimeRange {
    /// Create a new time range.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, granularity: Granularity) -> Self {
        Self {
            start,
            end,
            granularity,
        }
    }

    /// Window covering the trailing `duration` ending now.
    pub fn trailing(duration: Duration, granularity: Granularity) -> Self {
        let end = Utc::now();
        let start = end - chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        Self::new(start, end, granularity)
    }

    /// Whether `ts` falls inside the window. Both bounds are inclusive; the
    /// same semantics apply wherever records are filtered against the range.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Wall-clock length of the window.
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}..{} ({})",
            self.start.to_rfc3339(),
            self.end.to_rfc3339(),
            self.granularity
        )
    }
}

fn default_enabled() -> bool {
    true
}

/// Configuration for one collection of one source.
///
/// Many configs may share a `source_type`; the `name` distinguishes them.
/// Source-specific fields land in `params` untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Registry key of the source implementation.
    #[serde(rename = "type")]
    pub source_type: String,
    /// Unique name for this config instance.
    pub name: String,
    /// Disabled configs are skipped entirely (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-attempt collection timeout; falls back to the engine default.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Total attempts before giving up; falls back to the engine default.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Source-specific parameters.
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl SourceConfig {
    /// Create a minimal enabled config.
    pub fn new(source_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            name: name.into(),
            enabled: true,
            timeout: None,
            max_retries: None,
            params: BTreeMap::new(),
        }
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the attempt budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set enabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add a source-specific parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Look up a source-specific parameter.
    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }

    /// Look up a string-valued parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// `"type/name"` identifier used in progress and report metadata.
    pub fn identifier(&self) -> String {
        format!("{}/{}", self.source_type, self.name)
    }
}

/// Result of one successful source collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedData {
    /// Registry key of the producing source.
    pub source_type: String,
    /// Config name the data was collected under.
    pub source_name: String,
    /// Records payload; a JSON array of records, or a single opaque payload.
    pub data: serde_json::Value,
    /// When the collection completed.
    pub collected_at: DateTime<Utc>,
}

impl CollectedData {
    /// Create a payload stamped with the current time.
    pub fn new(
        source_type: impl Into<String>,
        source_name: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            source_name: source_name.into(),
            data,
            collected_at: Utc::now(),
        }
    }

    /// Number of data points: the sequence length for an array payload,
    /// otherwise 1.
    pub fn data_points(&self) -> usize {
        match &self.data {
            serde_json::Value::Array(records) => records.len(),
            _ => 1,
        }
    }
}

/// Outcome of asking a source to validate a config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the config is usable as-is.
    pub is_valid: bool,
    /// Human-readable problems, empty when valid.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// A passing report.
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing report with the given problems.
    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }
}

/// Errors produced while collecting from a source.
///
/// These are data as much as errors: the orchestrator accumulates them into
/// the final [`CollectionResult`](crate::engine::CollectionResult) rather
/// than only propagating them, so every variant is serializable and carries
/// the context needed to report it without re-deriving anything.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectError {
    /// Config validation failed before dispatch. Never retried.
    #[error("invalid config for {source_type}/{name}: {message}")]
    Config {
        source_type: String,
        name: String,
        message: String,
    },

    /// Connectivity probe failed.
    #[error("connection failed for {source_type}/{name}: {message}")]
    Connection {
        source_type: String,
        name: String,
        message: String,
    },

    /// Collection failed after exhausting retries (or timed out on every
    /// attempt).
    #[error("collection failed for {source_type}/{name} over {time_range}: {message}")]
    Collection {
        source_type: String,
        name: String,
        time_range: TimeRange,
        message: String,
        /// Last underlying failure, when one was observed.
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },

    /// The type was absent from the registry at the time of use.
    #[error("no source registered for type '{source_type}' (config '{name}')")]
    UnregisteredType { source_type: String, name: String },
}

impl CollectError {
    /// Build a [`CollectError::Config`].
    pub fn config(
        source_type: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Config {
            source_type: source_type.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Build a [`CollectError::Connection`].
    pub fn connection(
        source_type: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Connection {
            source_type: source_type.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Build a [`CollectError::Collection`].
    pub fn collection(
        source_type: impl Into<String>,
        name: impl Into<String>,
        time_range: TimeRange,
        message: impl Into<String>,
        cause: Option<String>,
    ) -> Self {
        Self::Collection {
            source_type: source_type.into(),
            name: name.into(),
            time_range,
            message: message.into(),
            cause,
        }
    }

    /// Build a [`CollectError::UnregisteredType`].
    pub fn unregistered(source_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnregisteredType {
            source_type: source_type.into(),
            name: name.into(),
        }
    }

    /// Registry key of the failing source.
    pub fn source_type(&self) -> &str {
        match self {
            Self::Config { source_type, .. }
            | Self::Connection { source_type, .. }
            | Self::Collection { source_type, .. }
            | Self::UnregisteredType { source_type, .. } => source_type,
        }
    }

    /// Config name the failure occurred under.
    pub fn name(&self) -> &str {
        match self {
            Self::Config { name, .. }
            | Self::Connection { name, .. }
            | Self::Collection { name, .. }
            | Self::UnregisteredType { name, .. } => name,
        }
    }
}

/// Capability contract for a pluggable data source.
///
/// Implementations are registered with the
/// [`SourceRegistry`](crate::source::SourceRegistry) under their
/// `source_type` key and invoked by the engine for every config that names
/// that type.
///
/// `collect` must be retry-safe: the runner calls it up to `max_retries`
/// times for transient failures, so implementations should be pure reads or
/// otherwise idempotent.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Registry key for this implementation.
    fn source_type(&self) -> &str;

    /// Check whether `config` is usable. May perform I/O but is not required
    /// to.
    async fn validate(&self, config: &SourceConfig) -> ValidationReport;

    /// Probe connectivity to the backing system.
    async fn test_connection(&self, config: &SourceConfig) -> Result<bool, CollectError>;

    /// Collect all records for `config` inside `range`.
    async fn collect(
        &self,
        config: &SourceConfig,
        range: &TimeRange,
    ) -> Result<CollectedData, CollectError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn range() -> TimeRange {
        TimeRange::new(
            "2026-01-01T00:00:00Z".parse().unwrap(),
            "2026-01-31T00:00:00Z".parse().unwrap(),
            Granularity::Day,
        )
    }

    #[test]
    fn test_time_range_contains_inclusive_bounds() {
        let r = range();
        assert!(r.contains(r.start));
        assert!(r.contains(r.end));
        assert!(r.contains("2026-01-15T12:00:00Z".parse().unwrap()));
        assert!(!r.contains("2025-12-31T23:59:59Z".parse().unwrap()));
        assert!(!r.contains("2026-01-31T00:00:01Z".parse().unwrap()));
    }

    #[test]
    fn test_granularity_from_str() {
        assert_eq!("day".parse::<Granularity>().ok(), Some(Granularity::Day));
        assert_eq!("Week".parse::<Granularity>().ok(), Some(Granularity::Week));
        assert!("fortnight".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_data_points_counts_sequences() {
        let seq = CollectedData::new("git", "a", json!([1, 2, 3]));
        assert_eq!(seq.data_points(), 3);

        let scalar = CollectedData::new("git", "a", json!({"total": 42}));
        assert_eq!(scalar.data_points(), 1);

        let empty = CollectedData::new("git", "a", json!([]));
        assert_eq!(empty.data_points(), 0);
    }

    #[test]
    fn test_source_config_serde_defaults() {
        let yaml = r#"
type: git
name: backend-repo
repo_path: /srv/repos/backend
"#;
        let config: SourceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.source_type, "git");
        assert_eq!(config.name, "backend-repo");
        assert!(config.enabled);
        assert!(config.timeout.is_none());
        assert!(config.max_retries.is_none());
        assert_eq!(config.param_str("repo_path"), Some("/srv/repos/backend"));
    }

    #[test]
    fn test_source_config_serde_full() {
        let yaml = r#"
type: http-api
name: ci-builds
enabled: false
timeout: 30s
max_retries: 5
url: https://ci.example.com/api/builds
"#;
        let config: SourceConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.timeout, Some(std::time::Duration::from_secs(30)));
        assert_eq!(config.max_retries, Some(5));
        assert_eq!(
            config.param_str("url"),
            Some("https://ci.example.com/api/builds")
        );
    }

    #[test]
    fn test_collect_error_display_carries_context() {
        let err = CollectError::collection(
            "git",
            "backend",
            range(),
            "giving up after 3 attempts: Operation timed out",
            Some("Operation timed out".to_string()),
        );
        let msg = err.to_string();
        assert!(msg.contains("git/backend"));
        assert!(msg.contains("Operation timed out"));
        assert_eq!(err.source_type(), "git");
        assert_eq!(err.name(), "backend");
    }

    #[test]
    fn test_collect_error_serializes_tagged() {
        let err = CollectError::unregistered("ghost", "g1");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "unregistered_type");
        assert_eq!(value["source_type"], "ghost");
        assert_eq!(value["name"], "g1");
    }

    #[test]
    fn test_config_identifier() {
        let config = SourceConfig::new("git", "backend");
        assert_eq!(config.identifier(), "git/backend");
    }
}
