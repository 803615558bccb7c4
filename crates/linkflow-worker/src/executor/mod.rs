// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed node executors and the executor registry.
//!
//! An executor owns one node type. Executors never mutate shared state and
//! honor cancellation (the service wraps every call in the task's timeout;
//! dropping the future aborts the work).

pub mod condition;
pub mod delay;
pub mod http;
pub mod stub;
pub mod trigger;

pub use self::condition::ConditionExecutor;
pub use self::delay::DelayExecutor;
pub use self::http::HttpExecutor;
pub use self::stub::{LoopExecutor, TransformExecutor};
pub use self::trigger::TriggerExecutor;

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Classification of an execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient; the activity will be rescheduled per the retry policy.
    Retryable,
    /// Terminal; surfaces as a permanent failure.
    NonRetryable,
    /// The work exceeded a deadline.
    Timeout,
}

/// An application-level execution error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    /// Human-readable message.
    pub message: String,
    /// Classification.
    pub kind: ErrorKind,
}

impl ExecutionError {
    /// A retryable error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Retryable,
        }
    }

    /// A terminal error.
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::NonRetryable,
        }
    }

    /// A timeout.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Timeout,
        }
    }
}

/// One log line produced during execution.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// When the line was produced.
    pub timestamp: DateTime<Utc>,
    /// Severity label.
    pub level: &'static str,
    /// The message.
    pub message: String,
}

impl LogEntry {
    /// An INFO-level entry stamped now.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: "INFO",
            message: message.into(),
        }
    }
}

/// A request to execute one node.
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    /// Node type.
    pub node_type: String,
    /// Node id within the definition.
    pub node_id: String,
    /// Workflow id.
    pub workflow_id: String,
    /// Run id.
    pub run_id: String,
    /// Namespace.
    pub namespace: String,
    /// Node configuration (JSON).
    pub config: Vec<u8>,
    /// Node input (JSON).
    pub input: Vec<u8>,
    /// Attempt, 1-based.
    pub attempt: i32,
    /// Deadline for the whole execution.
    pub timeout: Duration,
}

/// The outcome of one execution.
#[derive(Debug, Clone, Default)]
pub struct ExecuteResponse {
    /// Output payload (JSON).
    pub output: Vec<u8>,
    /// Application-level error, if the node failed.
    pub error: Option<ExecutionError>,
    /// Log lines produced along the way.
    pub logs: Vec<LogEntry>,
    /// Wall-clock duration of the execution.
    pub duration: Duration,
}

impl ExecuteResponse {
    /// A failed response with no output.
    pub fn failed(error: ExecutionError, logs: Vec<LogEntry>, duration: Duration) -> Self {
        Self {
            output: Vec::new(),
            error: Some(error),
            logs,
            duration,
        }
    }
}

/// A typed node executor.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The node type this executor owns.
    fn node_type(&self) -> &str;

    /// Execute one node. System-level failures (not application errors)
    /// are the `Err` branch; application failures travel in
    /// [`ExecuteResponse::error`].
    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, ExecutionError>;
}

/// Registry error: duplicate registration.
#[derive(Debug, Clone, thiserror::Error)]
#[error("executor for node type '{0}' is already registered")]
pub struct AlreadyRegistered(pub String);

/// String-keyed map from node type to executor.
#[derive(Default)]
pub struct Registry {
    executors: RwLock<HashMap<String, std::sync::Arc<dyn Executor>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor. Registration is mutually exclusive per type.
    pub fn register(
        &self,
        executor: std::sync::Arc<dyn Executor>,
    ) -> Result<(), AlreadyRegistered> {
        let node_type = executor.node_type().to_string();
        let mut executors = self.executors.write().unwrap_or_else(|e| e.into_inner());
        if executors.contains_key(&node_type) {
            return Err(AlreadyRegistered(node_type));
        }
        executors.insert(node_type, executor);
        Ok(())
    }

    /// Look up an executor by node type.
    pub fn get(&self, node_type: &str) -> Option<std::sync::Arc<dyn Executor>> {
        let executors = self.executors.read().unwrap_or_else(|e| e.into_inner());
        executors.get(node_type).cloned()
    }

    /// Execute a request, routing on `request.node_type`. A missing type
    /// yields a `NonRetryable` execution error, never a panic.
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, ExecutionError> {
        let Some(executor) = self.get(&request.node_type) else {
            return Ok(ExecuteResponse::failed(
                ExecutionError::non_retryable(format!(
                    "no executor found for node type: {}",
                    request.node_type
                )),
                Vec::new(),
                Duration::ZERO,
            ));
        };
        executor.execute(request).await
    }

    /// All registered node types.
    pub fn node_types(&self) -> Vec<String> {
        let executors = self.executors.read().unwrap_or_else(|e| e.into_inner());
        executors.keys().cloned().collect()
    }

    /// Number of registered executors.
    pub fn count(&self) -> usize {
        let executors = self.executors.read().unwrap_or_else(|e| e.into_inner());
        executors.len()
    }
}

/// A registry with every built-in executor registered.
pub fn builtin_registry() -> Registry {
    let registry = Registry::new();
    // A fresh registry cannot hold duplicates.
    let _ = registry.register(std::sync::Arc::new(TriggerExecutor::manual()));
    let _ = registry.register(std::sync::Arc::new(TriggerExecutor::webhook()));
    let _ = registry.register(std::sync::Arc::new(TriggerExecutor::schedule()));
    let _ = registry.register(std::sync::Arc::new(HttpExecutor::new()));
    let _ = registry.register(std::sync::Arc::new(DelayExecutor::new()));
    let _ = registry.register(std::sync::Arc::new(ConditionExecutor::new()));
    let _ = registry.register(std::sync::Arc::new(TransformExecutor::new()));
    let _ = registry.register(std::sync::Arc::new(LoopExecutor::new()));
    registry
}
