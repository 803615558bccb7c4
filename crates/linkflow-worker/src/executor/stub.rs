// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Executors for node types the runtime accepts but does not execute yet.
//!
//! These fail terminally instead of silently passing input through: a
//! workflow that relies on them should fail loudly, not produce bogus data.

use std::time::Instant;

use async_trait::async_trait;

use super::{ExecuteRequest, ExecuteResponse, ExecutionError, Executor};

/// `transform` nodes require explicit transformation rules.
#[derive(Debug, Default)]
pub struct TransformExecutor;

impl TransformExecutor {
    /// Create a transform executor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for TransformExecutor {
    fn node_type(&self) -> &str {
        "transform"
    }

    async fn execute(&self, _request: &ExecuteRequest) -> Result<ExecuteResponse, ExecutionError> {
        let start = Instant::now();
        Ok(ExecuteResponse::failed(
            ExecutionError::non_retryable(
                "transform executor not yet implemented: transformation rules required",
            ),
            Vec::new(),
            start.elapsed(),
        ))
    }
}

/// `loop` nodes belong to the scheduler, not a direct executor.
#[derive(Debug, Default)]
pub struct LoopExecutor;

impl LoopExecutor {
    /// Create a loop executor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for LoopExecutor {
    fn node_type(&self) -> &str {
        "loop"
    }

    async fn execute(&self, _request: &ExecuteRequest) -> Result<ExecuteResponse, ExecutionError> {
        let start = Instant::now();
        Ok(ExecuteResponse::failed(
            ExecutionError::non_retryable(
                "loop executor not yet implemented: loop logic belongs to the workflow driver",
            ),
            Vec::new(),
            start.elapsed(),
        ))
    }
}
