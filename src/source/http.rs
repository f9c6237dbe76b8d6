//! Generic HTTP JSON API source.
//!
//! Collects records from any endpoint that can be queried with a time
//! window and answers JSON. Covers simple issue-tracker and CI exports
//! without a dedicated source per vendor.

use reqwest::Client;
use serde_json::Value;
use serde_json_path::JsonPath;

use crate::config::expand_env_vars;
use crate::source::{
    CollectError, CollectedData, DataSource, SourceConfig, TimeRange, ValidationReport,
};

/// Registry key of this source.
pub const HTTP_SOURCE_TYPE: &str = "http-api";

/// HTTP JSON API source.
///
/// Params: `url` (required), `headers` (optional string map, values support
/// `${VAR}` / `${VAR:-default}` expansion so tokens stay out of config
/// files), `records_path` (optional JSONPath selecting the records inside
/// the response body; default is the whole body).
///
/// The window is passed as `since`/`until` RFC 3339 query parameters.
pub struct HttpApiSource {
    client: Client,
}

impl std::fmt::Debug for HttpApiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiSource").finish_non_exhaustive()
    }
}

impl Default for HttpApiSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpApiSource {
    /// Create the source with a fresh client.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn url<'a>(&self, config: &'a SourceConfig) -> Result<&'a str, CollectError> {
        config.param_str("url").ok_or_else(|| {
            CollectError::config(HTTP_SOURCE_TYPE, &config.name, "missing required param 'url'")
        })
    }

    fn apply_headers(
        &self,
        mut request: reqwest::RequestBuilder,
        config: &SourceConfig,
    ) -> reqwest::RequestBuilder {
        if let Some(headers) = config.param("headers").and_then(|v| v.as_object()) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key.as_str(), expand_env_vars(value));
                }
            }
        }
        request
    }
}

#[async_trait::async_trait]
impl DataSource for HttpApiSource {
    fn source_type(&self) -> &str {
        HTTP_SOURCE_TYPE
    }

    async fn validate(&self, config: &SourceConfig) -> ValidationReport {
        let mut errors = Vec::new();

        match config.param_str("url") {
            None => errors.push("missing required param 'url'".to_string()),
            Some(raw) => {
                if let Err(e) = url::Url::parse(raw) {
                    errors.push(format!("invalid URL '{}': {}", raw, e));
                }
            }
        }

        if let Some(expr) = config.param_str("records_path") {
            if let Err(e) = expr.parse::<JsonPath>() {
                errors.push(format!("invalid records_path '{}': {}", expr, e));
            }
        }

        if let Some(headers) = config.param("headers") {
            if !headers.is_object() {
                errors.push("param 'headers' must be a string map".to_string());
            }
        }

        if errors.is_empty() {
            ValidationReport::ok()
        } else {
            ValidationReport::invalid(errors)
        }
    }

    async fn test_connection(&self, config: &SourceConfig) -> Result<bool, CollectError> {
        let url = self.url(config)?;

        let request = self.apply_headers(self.client.get(url), config);
        let response = request.send().await.map_err(|e| {
            CollectError::connection(
                HTTP_SOURCE_TYPE,
                &config.name,
                format!("probe of '{}' failed: {}", url, e),
            )
        })?;

        Ok(response.status().is_success())
    }

    async fn collect(
        &self,
        config: &SourceConfig,
        range: &TimeRange,
    ) -> Result<CollectedData, CollectError> {
        let url = self.url(config)?;

        let request = self
            .client
            .get(url)
            .query(&[
                ("since", range.start.to_rfc3339()),
                ("until", range.end.to_rfc3339()),
            ]);
        let request = self.apply_headers(request, config);

        let response = request.send().await.map_err(|e| {
            CollectError::collection(
                HTTP_SOURCE_TYPE,
                &config.name,
                range.clone(),
                format!("request to '{}' failed", url),
                Some(e.to_string()),
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectError::collection(
                HTTP_SOURCE_TYPE,
                &config.name,
                range.clone(),
                format!("'{}' answered {}", url, status),
                None,
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            CollectError::collection(
                HTTP_SOURCE_TYPE,
                &config.name,
                range.clone(),
                "response body is not valid JSON",
                Some(e.to_string()),
            )
        })?;

        let data = match config.param_str("records_path") {
            Some(expr) => select_records(&body, expr).map_err(|message| {
                CollectError::config(HTTP_SOURCE_TYPE, &config.name, message)
            })?,
            None => body,
        };

        Ok(CollectedData::new(HTTP_SOURCE_TYPE, &config.name, data))
    }
}

/// Select the records array out of `body` with a JSONPath expression.
fn select_records(body: &Value, expr: &str) -> Result<Value, String> {
    let path: JsonPath = expr
        .parse()
        .map_err(|e| format!("invalid records_path '{}': {}", expr, e))?;

    let records: Vec<Value> = path.query(body).all().into_iter().cloned().collect();
    Ok(Value::Array(records))
}
