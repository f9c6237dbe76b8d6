//! Git commit history source.
//!
//! Collects commits from a local repository by shelling out to `git log`
//! with the collection window as `--since`/`--until` bounds. Records are
//! plain JSON objects so downstream analytics stay format-agnostic.

use std::path::Path;

use serde_json::{Value, json};
use tokio::process::Command;

use crate::source::{
    CollectError, CollectedData, DataSource, SourceConfig, TimeRange, ValidationReport,
};

/// Registry key of this source.
pub const GIT_SOURCE_TYPE: &str = "git";

/// Field separator in the `git log` pretty format (ASCII unit separator).
const FIELD_SEP: char = '\u{1f}';
/// Record separator (ASCII record separator).
const RECORD_SEP: char = '\u{1e}';

/// Commit history source backed by the `git` CLI.
///
/// Params: `repo_path` (required), `branch` (optional, defaults to all
/// refs), `author` (optional filter).
#[derive(Debug, Default)]
pub struct GitLogSource;

impl GitLogSource {
    /// Create the source.
    pub fn new() -> Self {
        Self
    }

    fn repo_path<'a>(&self, config: &'a SourceConfig) -> Result<&'a str, CollectError> {
        config.param_str("repo_path").ok_or_else(|| {
            CollectError::config(
                GIT_SOURCE_TYPE,
                &config.name,
                "missing required param 'repo_path'",
            )
        })
    }
}

#[async_trait::async_trait]
impl DataSource for GitLogSource {
    fn source_type(&self) -> &str {
        GIT_SOURCE_TYPE
    }

    async fn validate(&self, config: &SourceConfig) -> ValidationReport {
        let mut errors = Vec::new();

        match config.param_str("repo_path") {
            None => errors.push("missing required param 'repo_path'".to_string()),
            Some("") => errors.push("param 'repo_path' cannot be empty".to_string()),
            Some(path) => {
                if !Path::new(path).exists() {
                    errors.push(format!("repo_path '{}' does not exist", path));
                }
            }
        }

        if let Some(author) = config.param("author") {
            if !author.is_string() {
                errors.push("param 'author' must be a string".to_string());
            }
        }

        if errors.is_empty() {
            ValidationReport::ok()
        } else {
            ValidationReport::invalid(errors)
        }
    }

    async fn test_connection(&self, config: &SourceConfig) -> Result<bool, CollectError> {
        let repo = self.repo_path(config)?;

        let output = Command::new("git")
            .args(["-C", repo, "rev-parse", "--git-dir"])
            .output()
            .await
            .map_err(|e| {
                CollectError::connection(
                    GIT_SOURCE_TYPE,
                    &config.name,
                    format!("failed to run git: {}", e),
                )
            })?;

        Ok(output.status.success())
    }

    async fn collect(
        &self,
        config: &SourceConfig,
        range: &TimeRange,
    ) -> Result<CollectedData, CollectError> {
        let repo = self.repo_path(config)?;

        let mut cmd = Command::new("git");
        cmd.args(["-C", repo, "log"]);
        match config.param_str("branch") {
            Some(branch) => {
                cmd.arg(branch);
            }
            None => {
                cmd.arg("--all");
            }
        }
        cmd.arg(format!("--since={}", range.start.to_rfc3339()));
        cmd.arg(format!("--until={}", range.end.to_rfc3339()));
        if let Some(author) = config.param_str("author") {
            cmd.arg(format!("--author={}", author));
        }
        // %x1f/%x1e keep the fields parseable without escaping commit text.
        cmd.arg("--pretty=format:%H%x1f%an%x1f%ae%x1f%aI%x1f%s%x1e");

        let output = cmd.output().await.map_err(|e| {
            CollectError::collection(
                GIT_SOURCE_TYPE,
                &config.name,
                range.clone(),
                "failed to run git log",
                Some(e.to_string()),
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollectError::collection(
                GIT_SOURCE_TYPE,
                &config.name,
                range.clone(),
                format!("git log exited with {}", output.status),
                Some(stderr.trim().to_string()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let commits: Vec<Value> = stdout
            .split(RECORD_SEP)
            .filter_map(parse_commit_record)
            .collect();

        tracing::debug!(
            source = %config.identifier(),
            commits = commits.len(),
            "Collected git history"
        );

        Ok(CollectedData::new(
            GIT_SOURCE_TYPE,
            &config.name,
            Value::Array(commits),
        ))
    }
}

/// Parse one `%H<US>%an<US>%ae<US>%aI<US>%s` chunk into a commit record.
fn parse_commit_record(chunk: &str) -> Option<Value> {
    let chunk = chunk.trim();
    if chunk.is_empty() {
        return None;
    }

    let mut fields = chunk.splitn(5, FIELD_SEP);
    let hash = fields.next()?.trim();
    let author = fields.next()?;
    let email = fields.next()?;
    let date = fields.next()?;
    let subject = fields.next().unwrap_or("");

    if hash.is_empty() {
        return None;
    }

    Some(json!({
        "hash": hash,
        "author": author,
        "email": email,
        "date": date,
        "subject": subject,
    }))
}
