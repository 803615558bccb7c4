// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Trigger node executors: pass the trigger data through unchanged.

use std::time::Instant;

use async_trait::async_trait;

use super::{ExecuteRequest, ExecuteResponse, ExecutionError, Executor};

/// Executes trigger nodes (`trigger_manual`, `trigger_webhook`,
/// `trigger_schedule`). The trigger's input is the execution's trigger
/// data; its output is that data, `{}` when empty.
#[derive(Debug)]
pub struct TriggerExecutor {
    node_type: &'static str,
}

impl TriggerExecutor {
    /// The `trigger_manual` executor.
    pub fn manual() -> Self {
        Self {
            node_type: "trigger_manual",
        }
    }

    /// The `trigger_webhook` executor.
    pub fn webhook() -> Self {
        Self {
            node_type: "trigger_webhook",
        }
    }

    /// The `trigger_schedule` executor.
    pub fn schedule() -> Self {
        Self {
            node_type: "trigger_schedule",
        }
    }
}

#[async_trait]
impl Executor for TriggerExecutor {
    fn node_type(&self) -> &str {
        self.node_type
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, ExecutionError> {
        let start = Instant::now();
        let output = if request.input.is_empty() {
            b"{}".to_vec()
        } else {
            request.input.clone()
        };
        Ok(ExecuteResponse {
            output,
            duration: start.elapsed(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_passes_data_through() {
        let executor = TriggerExecutor::manual();
        assert_eq!(executor.node_type(), "trigger_manual");

        let response = executor
            .execute(&ExecuteRequest {
                input: br#"{"from":"api"}"#.to_vec(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(response.output, br#"{"from":"api"}"#);

        let response = executor
            .execute(&ExecuteRequest::default())
            .await
            .unwrap();
        assert_eq!(response.output, b"{}");
    }
}
