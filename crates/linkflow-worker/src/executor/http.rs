// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP node executor.
//!
//! Classification: transport failures are retryable (timeouts are
//! timeouts), 5xx responses are retryable, 4xx responses are terminal.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ExecuteRequest, ExecuteResponse, ExecutionError, Executor, LogEntry};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration of an `http` node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
    /// HTTP method; defaults to GET.
    #[serde(default)]
    pub method: String,
    /// Request URL.
    #[serde(default)]
    pub url: String,
    /// Request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request body (JSON), sent verbatim.
    #[serde(default)]
    pub body: Option<Value>,
    /// Per-request timeout in seconds; 0 uses the client default.
    #[serde(default)]
    pub timeout: u64,
}

/// Response payload of an `http` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpOutput {
    /// Response status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body, parsed as JSON when possible, a string otherwise.
    pub body: Value,
}

/// Executes `http` nodes with a pooled client.
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpExecutor {
    /// Create an executor with connection pooling.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            // The builder only fails on TLS backend misconfiguration.
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    fn node_type(&self) -> &str {
        "http"
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, ExecutionError> {
        let start = Instant::now();
        let mut logs = vec![LogEntry::info(format!(
            "starting HTTP execution for node {}",
            request.node_id
        ))];

        let config: HttpConfig = match serde_json::from_slice(&request.config) {
            Ok(config) => config,
            Err(err) => {
                return Ok(ExecuteResponse::failed(
                    ExecutionError::non_retryable(format!("failed to parse HTTP config: {err}")),
                    logs,
                    start.elapsed(),
                ));
            }
        };

        let method = if config.method.is_empty() {
            "GET".to_string()
        } else {
            config.method.to_uppercase()
        };
        let method = match reqwest::Method::from_bytes(method.as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return Ok(ExecuteResponse::failed(
                    ExecutionError::non_retryable(format!("invalid HTTP method: {method}")),
                    logs,
                    start.elapsed(),
                ));
            }
        };

        let mut builder = self.client.request(method.clone(), &config.url);
        for (key, value) in &config.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &config.body {
            builder = builder.json(body);
        }
        if config.timeout > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout));
        }

        logs.push(LogEntry::info(format!(
            "sending {method} request to {}",
            config.url
        )));

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                let error = if err.is_timeout() {
                    ExecutionError::timeout(format!("HTTP request timed out: {err}"))
                } else {
                    ExecutionError::retryable(format!("HTTP request failed: {err}"))
                };
                return Ok(ExecuteResponse::failed(error, logs, start.elapsed()));
            }
        };

        let status = response.status();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        let body_bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                return Ok(ExecuteResponse::failed(
                    ExecutionError::retryable(format!("failed to read response body: {err}")),
                    logs,
                    start.elapsed(),
                ));
            }
        };

        logs.push(LogEntry::info(format!(
            "received response with status {}",
            status.as_u16()
        )));

        let body = serde_json::from_slice(&body_bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&body_bytes).into_owned())
        });
        let output = HttpOutput {
            status_code: status.as_u16(),
            headers,
            body,
        };
        let output_bytes = serde_json::to_vec(&output)
            .map_err(|err| ExecutionError::non_retryable(format!("failed to encode output: {err}")))?;

        let error = if status.is_server_error() {
            Some(ExecutionError::retryable(format!(
                "server error: status {}",
                status.as_u16()
            )))
        } else if status.is_client_error() {
            Some(ExecutionError::non_retryable(format!(
                "client error: status {}",
                status.as_u16()
            )))
        } else {
            None
        };

        Ok(ExecuteResponse {
            output: output_bytes,
            error,
            logs,
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ErrorKind;

    #[tokio::test]
    async fn test_bad_config_is_non_retryable() {
        let executor = HttpExecutor::new();
        let response = executor
            .execute(&ExecuteRequest {
                node_type: "http".to_string(),
                config: b"not json".to_vec(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().kind, ErrorKind::NonRetryable);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_retryable() {
        let executor = HttpExecutor::new();
        // Reserved TEST-NET address: connection fails fast.
        let config = br#"{"method":"GET","url":"http://192.0.2.1:9/","timeout":1}"#;
        let response = executor
            .execute(&ExecuteRequest {
                node_type: "http".to_string(),
                config: config.to_vec(),
                ..Default::default()
            })
            .await
            .unwrap();
        let error = response.error.unwrap();
        assert!(matches!(
            error.kind,
            ErrorKind::Retryable | ErrorKind::Timeout
        ));
    }
}
