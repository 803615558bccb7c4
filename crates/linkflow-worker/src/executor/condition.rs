// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Condition node executor: evaluates a comparison against the input.

use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ExecuteRequest, ExecuteResponse, ExecutionError, Executor};

/// Configuration of a `condition` node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConditionConfig {
    /// Dot-separated path into the input object.
    #[serde(default)]
    pub field: String,
    /// One of `eq`, `neq`, `gt`, `lt`, `contains`, `exists`.
    #[serde(default)]
    pub operator: String,
    /// Comparison operand.
    #[serde(default)]
    pub value: Value,
}

/// Executes `condition` nodes.
#[derive(Debug, Default)]
pub struct ConditionExecutor;

impl ConditionExecutor {
    /// Create a condition executor.
    pub fn new() -> Self {
        Self
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn evaluate(config: &ConditionConfig, input: &Value) -> Result<bool, String> {
    let field = lookup(input, &config.field);
    match config.operator.as_str() {
        "exists" => Ok(field.is_some()),
        "eq" => Ok(field == Some(&config.value)),
        "neq" => Ok(field != Some(&config.value)),
        "gt" | "lt" => {
            let (Some(left), Some(right)) = (
                field.and_then(Value::as_f64),
                config.value.as_f64(),
            ) else {
                return Ok(false);
            };
            Ok(if config.operator == "gt" {
                left > right
            } else {
                left < right
            })
        }
        "contains" => {
            let Some(field) = field else { return Ok(false) };
            match (field, &config.value) {
                (Value::String(haystack), Value::String(needle)) => {
                    Ok(haystack.contains(needle.as_str()))
                }
                (Value::Array(items), needle) => Ok(items.contains(needle)),
                _ => Ok(false),
            }
        }
        other => Err(format!("unknown operator: {other}")),
    }
}

#[async_trait]
impl Executor for ConditionExecutor {
    fn node_type(&self) -> &str {
        "condition"
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, ExecutionError> {
        let start = Instant::now();

        let config: ConditionConfig = match serde_json::from_slice(&request.config) {
            Ok(config) => config,
            Err(err) => {
                return Ok(ExecuteResponse::failed(
                    ExecutionError::non_retryable(format!(
                        "failed to parse condition config: {err}"
                    )),
                    Vec::new(),
                    start.elapsed(),
                ));
            }
        };

        let input: Value = serde_json::from_slice(&request.input).unwrap_or(Value::Null);
        let matched = match evaluate(&config, &input) {
            Ok(matched) => matched,
            Err(message) => {
                return Ok(ExecuteResponse::failed(
                    ExecutionError::non_retryable(message),
                    Vec::new(),
                    start.elapsed(),
                ));
            }
        };

        let output = json!({ "matched": matched, "input": input });
        Ok(ExecuteResponse {
            output: serde_json::to_vec(&output)
                .map_err(|err| ExecutionError::non_retryable(err.to_string()))?,
            duration: start.elapsed(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ErrorKind;

    async fn run(config: &str, input: &str) -> Value {
        let executor = ConditionExecutor::new();
        let response = executor
            .execute(&ExecuteRequest {
                node_type: "condition".to_string(),
                config: config.as_bytes().to_vec(),
                input: input.as_bytes().to_vec(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(response.error.is_none(), "unexpected error");
        serde_json::from_slice(&response.output).unwrap()
    }

    #[tokio::test]
    async fn test_operators() {
        let out = run(
            r#"{"field":"status","operator":"eq","value":"active"}"#,
            r#"{"status":"active"}"#,
        )
        .await;
        assert_eq!(out["matched"], true);

        let out = run(
            r#"{"field":"count","operator":"gt","value":5}"#,
            r#"{"count":3}"#,
        )
        .await;
        assert_eq!(out["matched"], false);

        let out = run(
            r#"{"field":"nested.flag","operator":"exists","value":null}"#,
            r#"{"nested":{"flag":1}}"#,
        )
        .await;
        assert_eq!(out["matched"], true);

        let out = run(
            r#"{"field":"tags","operator":"contains","value":"red"}"#,
            r#"{"tags":["red","blue"]}"#,
        )
        .await;
        assert_eq!(out["matched"], true);
    }

    #[tokio::test]
    async fn test_unknown_operator_is_terminal() {
        let executor = ConditionExecutor::new();
        let response = executor
            .execute(&ExecuteRequest {
                node_type: "condition".to_string(),
                config: br#"{"field":"a","operator":"between","value":1}"#.to_vec(),
                input: b"{}".to_vec(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().kind, ErrorKind::NonRetryable);
    }
}
