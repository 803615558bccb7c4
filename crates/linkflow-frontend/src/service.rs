// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Start-workflow-execution: the write that creates an execution.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use linkflow_api::client::{ClientError, HistoryClient};
use linkflow_api::events::{
    EventAttributes, EventType, ExecutionStartedAttributes, HistoryEvent,
};
use linkflow_api::execution::ExecutionKey;

/// Default overall execution timeout.
const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(3600);
/// Default per-task timeout.
const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// A request to start one workflow execution.
#[derive(Debug, Clone)]
pub struct StartWorkflowExecutionRequest {
    /// Target namespace.
    pub namespace: String,
    /// Workflow id, stable across runs.
    pub workflow_id: String,
    /// Registered workflow type name.
    pub workflow_type: String,
    /// Task queue for the execution's decisions.
    pub task_queue: String,
    /// Execution input (the full intake payload).
    pub input: Vec<u8>,
    /// Idempotency/request id; becomes the initiator tag.
    pub request_id: String,
}

/// Starts workflow executions through a history client.
pub struct FrontendService {
    history: Arc<dyn HistoryClient>,
}

impl FrontendService {
    /// Create a frontend over a history client.
    pub fn new(history: Arc<dyn HistoryClient>) -> Self {
        Self { history }
    }

    /// Record `EXECUTION_STARTED` for a fresh run. Returns the run id.
    pub async fn start_workflow_execution(
        &self,
        request: &StartWorkflowExecutionRequest,
    ) -> Result<String, ClientError> {
        let run_id = Uuid::new_v4().to_string();
        let key = ExecutionKey::new(
            request.namespace.clone(),
            request.workflow_id.clone(),
            run_id.clone(),
        );

        let event = HistoryEvent {
            event_id: 1,
            event_type: EventType::ExecutionStarted,
            timestamp: Utc::now(),
            version: 1,
            task_id: 0,
            attributes: EventAttributes::ExecutionStarted(ExecutionStartedAttributes {
                workflow_type: request.workflow_type.clone(),
                task_queue: request.task_queue.clone(),
                input: request.input.clone(),
                execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
                run_timeout: DEFAULT_EXECUTION_TIMEOUT,
                task_timeout: DEFAULT_TASK_TIMEOUT,
                parent_execution: None,
                initiator: request.request_id.clone(),
            }),
        };

        self.history.record_event(&key, event).await?;

        info!(
            namespace = %request.namespace,
            workflow_id = %request.workflow_id,
            run_id = %run_id,
            task_queue = %request.task_queue,
            "started workflow execution"
        );
        Ok(run_id)
    }
}
