//! Configuration module.
//!
//! YAML-based configuration loading and validation for:
//! - Collection defaults (concurrency, timeouts, retry budget)
//! - Inline source configs and a source include directory

mod app;
mod sources;
mod validation;

pub use app::{AppConfig, CollectionDefaults};
pub use sources::SourcesConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration};
