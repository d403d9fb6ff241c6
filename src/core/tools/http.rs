//! Tools backed by HTTP GET endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::base::{ToolError, ToolHandler, ToolResult};
use crate::core::realtime::{RealtimeError, RealtimeResult, ToolDef};

/// Default request timeout for HTTP tools.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 10;

/// Configuration of one HTTP GET tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpToolConfig {
    /// Function name advertised to the model
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Endpoint queried with the call arguments as query parameters
    pub url: String,
    /// JSON schema of the arguments
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Forwards call arguments to a GET endpoint and returns its JSON body.
///
/// Scalar arguments become query parameters, arrays are comma-joined and
/// nulls are skipped. A non-JSON body is wrapped as `{"result": "<body>"}`.
pub struct HttpGetTool {
    config: HttpToolConfig,
    client: reqwest::Client,
}

impl HttpGetTool {
    pub fn new(config: HttpToolConfig) -> RealtimeResult<Self> {
        let timeout = config.timeout_seconds.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| {
                RealtimeError::InvalidConfiguration(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpToolConfig {
        &self.config
    }
}

#[async_trait]
impl ToolHandler for HttpGetTool {
    fn definition(&self) -> ToolDef {
        ToolDef::function(
            self.config.name.clone(),
            self.config.description.clone(),
            self.config.parameters.clone(),
        )
    }

    fn name(&self) -> String {
        self.config.name.clone()
    }

    async fn call(&self, args: Value) -> ToolResult<Value> {
        let query = query_pairs(&args)?;
        debug!("GET {} with {} parameter(s)", self.config.url, query.len());

        let response = self
            .client
            .get(&self.config.url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Decode(e.to_string()))?;

        if !status.is_success() {
            return Err(ToolError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body).unwrap_or_else(|_| json!({ "result": body })))
    }
}

/// Flatten a JSON arguments object into query parameters.
pub fn query_pairs(args: &Value) -> ToolResult<Vec<(String, String)>> {
    let map = match args {
        Value::Object(map) => map,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "expected an object, got {}",
                other
            )));
        }
    };

    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        match value {
            Value::Null => continue,
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(scalar_to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                pairs.push((key.clone(), joined));
            }
            other => pairs.push((key.clone(), scalar_to_string(other))),
        }
    }
    Ok(pairs)
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
