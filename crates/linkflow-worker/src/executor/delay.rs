// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Delay node executor: sleeps, then passes its input through.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

use super::{ExecuteRequest, ExecuteResponse, ExecutionError, Executor, LogEntry};

/// Configuration of a `delay` node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DelayConfig {
    /// Sleep duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

/// Executes `delay` nodes.
#[derive(Debug, Default)]
pub struct DelayExecutor;

impl DelayExecutor {
    /// Create a delay executor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for DelayExecutor {
    fn node_type(&self) -> &str {
        "delay"
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, ExecutionError> {
        let start = Instant::now();

        let config: DelayConfig = match serde_json::from_slice(&request.config) {
            Ok(config) => config,
            Err(_) if request.config.is_empty() => DelayConfig::default(),
            Err(err) => {
                return Ok(ExecuteResponse::failed(
                    ExecutionError::non_retryable(format!("failed to parse delay config: {err}")),
                    Vec::new(),
                    start.elapsed(),
                ));
            }
        };

        tokio::time::sleep(Duration::from_millis(config.duration_ms)).await;

        Ok(ExecuteResponse {
            output: request.input.clone(),
            logs: vec![LogEntry::info(format!(
                "delayed {} ms",
                config.duration_ms
            ))],
            duration: start.elapsed(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delay_passes_input_through() {
        let executor = DelayExecutor::new();
        let response = executor
            .execute(&ExecuteRequest {
                node_type: "delay".to_string(),
                config: br#"{"duration_ms":10}"#.to_vec(),
                input: b"{\"x\":1}".to_vec(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(response.error.is_none());
        assert_eq!(response.output, b"{\"x\":1}");
        assert!(response.duration >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_empty_config_means_no_delay() {
        let executor = DelayExecutor::new();
        let response = executor
            .execute(&ExecuteRequest {
                node_type: "delay".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(response.error.is_none());
    }
}
