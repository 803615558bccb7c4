// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC-backed implementations of the `linkflow-api` client traits.

use std::time::Duration;

use async_trait::async_trait;

use linkflow_api::client::{ClientError, HistoryClient, MatchingClient};
use linkflow_api::command::{Command, Failure};
use linkflow_api::events::HistoryEvent;
use linkflow_api::execution::{ExecutionKey, MutableState};
use linkflow_api::task::Task;

use crate::client::{ClientError as WireError, FlowClient};
use crate::messages::{HistoryRequest, HistoryResponse, MatchingRequest, MatchingResponse};

fn map_wire_error(err: WireError) -> ClientError {
    match err {
        WireError::Rpc { code, message } => ClientError::from_code(&code, &message),
        other => ClientError::Transport(other.to_string()),
    }
}

fn unexpected(what: &str) -> ClientError {
    ClientError::Transport(format!("unexpected response to {what}"))
}

/// History client over QUIC.
pub struct RemoteHistoryClient {
    client: FlowClient,
}

impl RemoteHistoryClient {
    /// Wrap a connected (or lazily connecting) [`FlowClient`].
    pub fn new(client: FlowClient) -> Self {
        Self { client }
    }

    async fn call(&self, request: &HistoryRequest) -> Result<HistoryResponse, ClientError> {
        let response: HistoryResponse =
            self.client.request(request).await.map_err(map_wire_error)?;
        if let HistoryResponse::Error(err) = response {
            return Err(ClientError::from_code(&err.code, &err.message));
        }
        Ok(response)
    }
}

#[async_trait]
impl HistoryClient for RemoteHistoryClient {
    async fn record_event(
        &self,
        key: &ExecutionKey,
        event: HistoryEvent,
    ) -> Result<i64, ClientError> {
        match self
            .call(&HistoryRequest::RecordEvent {
                key: key.clone(),
                event,
            })
            .await?
        {
            HistoryResponse::EventRecorded { event_id } => Ok(event_id),
            _ => Err(unexpected("RecordEvent")),
        }
    }

    async fn get_history(
        &self,
        key: &ExecutionKey,
        first_event_id: i64,
        last_event_id: i64,
    ) -> Result<Vec<HistoryEvent>, ClientError> {
        match self
            .call(&HistoryRequest::GetHistory {
                key: key.clone(),
                first_event_id,
                last_event_id,
            })
            .await?
        {
            HistoryResponse::History { events } => Ok(events),
            _ => Err(unexpected("GetHistory")),
        }
    }

    async fn get_mutable_state(&self, key: &ExecutionKey) -> Result<MutableState, ClientError> {
        match self
            .call(&HistoryRequest::GetMutableState { key: key.clone() })
            .await?
        {
            HistoryResponse::State { state } => Ok(state),
            _ => Err(unexpected("GetMutableState")),
        }
    }

    async fn respond_workflow_task_completed(
        &self,
        key: &ExecutionKey,
        task_token: &[u8],
        commands: Vec<Command>,
    ) -> Result<(), ClientError> {
        match self
            .call(&HistoryRequest::RespondWorkflowTaskCompleted {
                key: key.clone(),
                task_token: task_token.to_vec(),
                commands,
            })
            .await?
        {
            HistoryResponse::Ack => Ok(()),
            _ => Err(unexpected("RespondWorkflowTaskCompleted")),
        }
    }

    async fn respond_workflow_task_failed(
        &self,
        key: &ExecutionKey,
        task_token: &[u8],
        failure: Failure,
    ) -> Result<(), ClientError> {
        match self
            .call(&HistoryRequest::RespondWorkflowTaskFailed {
                key: key.clone(),
                task_token: task_token.to_vec(),
                failure,
            })
            .await?
        {
            HistoryResponse::Ack => Ok(()),
            _ => Err(unexpected("RespondWorkflowTaskFailed")),
        }
    }

    async fn respond_activity_task_completed(
        &self,
        key: &ExecutionKey,
        scheduled_event_id: i64,
        result: Vec<u8>,
    ) -> Result<(), ClientError> {
        match self
            .call(&HistoryRequest::RespondActivityTaskCompleted {
                key: key.clone(),
                scheduled_event_id,
                result,
            })
            .await?
        {
            HistoryResponse::Ack => Ok(()),
            _ => Err(unexpected("RespondActivityTaskCompleted")),
        }
    }

    async fn respond_activity_task_failed(
        &self,
        key: &ExecutionKey,
        scheduled_event_id: i64,
        failure: Failure,
    ) -> Result<(), ClientError> {
        match self
            .call(&HistoryRequest::RespondActivityTaskFailed {
                key: key.clone(),
                scheduled_event_id,
                failure,
            })
            .await?
        {
            HistoryResponse::Ack => Ok(()),
            _ => Err(unexpected("RespondActivityTaskFailed")),
        }
    }
}

/// Matching client over QUIC.
pub struct RemoteMatchingClient {
    client: FlowClient,
}

impl RemoteMatchingClient {
    /// Wrap a connected (or lazily connecting) [`FlowClient`].
    pub fn new(client: FlowClient) -> Self {
        Self { client }
    }

    async fn call(&self, request: &MatchingRequest) -> Result<MatchingResponse, ClientError> {
        let response: MatchingResponse =
            self.client.request(request).await.map_err(map_wire_error)?;
        if let MatchingResponse::Error(err) = response {
            return Err(ClientError::from_code(&err.code, &err.message));
        }
        Ok(response)
    }
}

#[async_trait]
impl MatchingClient for RemoteMatchingClient {
    async fn add_task(&self, task_queue: &str, task: Task) -> Result<(), ClientError> {
        match self
            .call(&MatchingRequest::AddTask {
                task_queue: task_queue.to_string(),
                task,
            })
            .await?
        {
            MatchingResponse::TaskAdded => Ok(()),
            _ => Err(unexpected("AddTask")),
        }
    }

    async fn poll_task(
        &self,
        task_queue: &str,
        identity: &str,
        block: Duration,
    ) -> Result<Option<Task>, ClientError> {
        match self
            .call(&MatchingRequest::PollTask {
                task_queue: task_queue.to_string(),
                identity: identity.to_string(),
                block_ms: block.as_millis() as u64,
            })
            .await?
        {
            MatchingResponse::Polled { task } => Ok(task),
            _ => Err(unexpected("PollTask")),
        }
    }

    async fn complete_task(&self, task_queue: &str, task_id: &str) -> Result<bool, ClientError> {
        match self
            .call(&MatchingRequest::CompleteTask {
                task_queue: task_queue.to_string(),
                task_id: task_id.to_string(),
            })
            .await?
        {
            MatchingResponse::Completed { found } => Ok(found),
            _ => Err(unexpected("CompleteTask")),
        }
    }
}
