// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process implementations of the history and matching client traits.
//!
//! These adapters let every service talk to its peers through the same
//! traits the QUIC clients implement, so the embedded runtime and the
//! distributed deployment share all service code.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use linkflow_api::client::{ClientError, HistoryClient, MatchingClient};
use linkflow_api::command::{Command, Failure};
use linkflow_api::events::HistoryEvent;
use linkflow_api::execution::{ExecutionKey, MutableState};
use linkflow_api::task::Task;
use linkflow_history::error::HistoryError;
use linkflow_matching::error::MatchingError;
use linkflow_matching::service::MatchingService;

fn map_history_error(err: HistoryError) -> ClientError {
    ClientError::from_code(err.error_code(), &err.to_string())
}

/// History client over an in-process service.
pub struct EmbeddedHistoryClient {
    service: Arc<linkflow_history::Service>,
}

impl EmbeddedHistoryClient {
    /// Wrap a history service.
    pub fn new(service: Arc<linkflow_history::Service>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl HistoryClient for EmbeddedHistoryClient {
    async fn record_event(
        &self,
        key: &ExecutionKey,
        event: HistoryEvent,
    ) -> Result<i64, ClientError> {
        self.service
            .record_event(key, event)
            .await
            .map_err(map_history_error)
    }

    async fn get_history(
        &self,
        key: &ExecutionKey,
        first_event_id: i64,
        last_event_id: i64,
    ) -> Result<Vec<HistoryEvent>, ClientError> {
        self.service
            .get_history(key, first_event_id, last_event_id)
            .await
            .map_err(map_history_error)
    }

    async fn get_mutable_state(&self, key: &ExecutionKey) -> Result<MutableState, ClientError> {
        self.service
            .get_mutable_state(key)
            .await
            .map_err(map_history_error)
    }

    async fn respond_workflow_task_completed(
        &self,
        key: &ExecutionKey,
        task_token: &[u8],
        commands: Vec<Command>,
    ) -> Result<(), ClientError> {
        self.service
            .respond_workflow_task_completed(key, task_token, commands)
            .await
            .map_err(map_history_error)
    }

    async fn respond_workflow_task_failed(
        &self,
        key: &ExecutionKey,
        task_token: &[u8],
        failure: Failure,
    ) -> Result<(), ClientError> {
        self.service
            .respond_workflow_task_failed(key, task_token, failure)
            .await
            .map_err(map_history_error)
    }

    async fn respond_activity_task_completed(
        &self,
        key: &ExecutionKey,
        scheduled_event_id: i64,
        result: Vec<u8>,
    ) -> Result<(), ClientError> {
        self.service
            .respond_activity_task_completed(key, scheduled_event_id, result)
            .await
            .map_err(map_history_error)
    }

    async fn respond_activity_task_failed(
        &self,
        key: &ExecutionKey,
        scheduled_event_id: i64,
        failure: Failure,
    ) -> Result<(), ClientError> {
        self.service
            .respond_activity_task_failed(key, scheduled_event_id, failure)
            .await
            .map_err(map_history_error)
    }
}

/// Matching client over an in-process service.
pub struct EmbeddedMatchingClient {
    service: Arc<MatchingService>,
}

impl EmbeddedMatchingClient {
    /// Wrap a matching service.
    pub fn new(service: Arc<MatchingService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MatchingClient for EmbeddedMatchingClient {
    async fn add_task(&self, task_queue: &str, task: Task) -> Result<(), ClientError> {
        self.service
            .add_task(task_queue, task)
            .await
            .map_err(|err| ClientError::from_code(err.error_code(), &err.to_string()))
    }

    async fn poll_task(
        &self,
        task_queue: &str,
        identity: &str,
        block: Duration,
    ) -> Result<Option<Task>, ClientError> {
        match tokio::time::timeout(block, self.service.poll_task(task_queue, identity)).await {
            Ok(Ok(task)) => Ok(Some(task)),
            // The block elapsed with nothing to hand out.
            Err(_) => Ok(None),
            Ok(Err(MatchingError::RateLimited)) => Err(ClientError::RateLimited),
            Ok(Err(err)) => Err(ClientError::from_code(err.error_code(), &err.to_string())),
        }
    }

    async fn complete_task(&self, task_queue: &str, task_id: &str) -> Result<bool, ClientError> {
        match self.service.complete_task(task_queue, task_id).await {
            Ok(()) => Ok(true),
            Err(MatchingError::TaskNotFound(_)) => Ok(false),
            Err(err) => Err(ClientError::from_code(err.error_code(), &err.to_string())),
        }
    }
}
