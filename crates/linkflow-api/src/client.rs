// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire-agnostic client traits for the history and matching services.
//!
//! Workers and the intake frontend only ever talk to these traits. The
//! QUIC-backed implementations live in `linkflow-protocol`; in-process
//! adapters live in `linkflow-engine`.

use std::time::Duration;

use async_trait::async_trait;

use crate::command::{Command, Failure};
use crate::events::HistoryEvent;
use crate::execution::{ExecutionKey, MutableState};
use crate::task::Task;

/// Errors surfaced by history and matching clients.
///
/// The closed set mirrors the engine's error design: callers match on the
/// variant, transports map stable error codes onto it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Malformed request; not retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Execution, event, task queue, or task was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic CAS conflict; safe to retry after a re-read.
    #[error("version mismatch")]
    VersionMismatch,

    /// The engine rejected the event (out of order, wrong state, ...).
    #[error("event rejected: {0}")]
    EventRejected(String),

    /// The target service is not running.
    #[error("service not running")]
    ServiceNotRunning,

    /// The poller was rate limited; back off before retrying.
    #[error("rate limited")]
    RateLimited,

    /// Transport-level failure; retry with policy.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Stable code for the wire.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::VersionMismatch => "VERSION_MISMATCH",
            Self::EventRejected(_) => "EVENT_REJECTED",
            Self::ServiceNotRunning => "SERVICE_NOT_RUNNING",
            Self::RateLimited => "RATE_LIMITED",
            Self::Transport(_) => "TRANSPORT",
        }
    }

    /// Rebuild a client error from a wire code and message.
    pub fn from_code(code: &str, message: &str) -> Self {
        match code {
            "INVALID_ARGUMENT" => Self::InvalidArgument(message.to_string()),
            "NOT_FOUND" => Self::NotFound(message.to_string()),
            "VERSION_MISMATCH" => Self::VersionMismatch,
            "EVENT_REJECTED" => Self::EventRejected(message.to_string()),
            "SERVICE_NOT_RUNNING" => Self::ServiceNotRunning,
            "RATE_LIMITED" => Self::RateLimited,
            _ => Self::Transport(format!("{code}: {message}")),
        }
    }
}

/// Client surface of the history service.
#[async_trait]
pub trait HistoryClient: Send + Sync {
    /// Record one event; returns the committed event id.
    async fn record_event(
        &self,
        key: &ExecutionKey,
        event: HistoryEvent,
    ) -> Result<i64, ClientError>;

    /// Fetch events in the inclusive `[first_event_id, last_event_id]` range.
    /// Values ≤ 0 normalize to the full range.
    async fn get_history(
        &self,
        key: &ExecutionKey,
        first_event_id: i64,
        last_event_id: i64,
    ) -> Result<Vec<HistoryEvent>, ClientError>;

    /// Fetch the mutable-state snapshot.
    async fn get_mutable_state(&self, key: &ExecutionKey) -> Result<MutableState, ClientError>;

    /// Apply the driver's commands for a completed workflow task.
    async fn respond_workflow_task_completed(
        &self,
        key: &ExecutionKey,
        task_token: &[u8],
        commands: Vec<Command>,
    ) -> Result<(), ClientError>;

    /// Report a failed workflow task.
    async fn respond_workflow_task_failed(
        &self,
        key: &ExecutionKey,
        task_token: &[u8],
        failure: Failure,
    ) -> Result<(), ClientError>;

    /// Report a completed activity by its scheduling event id.
    async fn respond_activity_task_completed(
        &self,
        key: &ExecutionKey,
        scheduled_event_id: i64,
        result: Vec<u8>,
    ) -> Result<(), ClientError>;

    /// Report a failed activity by its scheduling event id.
    async fn respond_activity_task_failed(
        &self,
        key: &ExecutionKey,
        scheduled_event_id: i64,
        failure: Failure,
    ) -> Result<(), ClientError>;
}

/// Client surface of the matching service.
#[async_trait]
pub trait MatchingClient: Send + Sync {
    /// Enqueue a task; duplicates are absorbed silently.
    async fn add_task(&self, task_queue: &str, task: Task) -> Result<(), ClientError>;

    /// Long-poll for a task. Blocks up to `block` server-side and returns
    /// `None` when nothing arrived in time.
    async fn poll_task(
        &self,
        task_queue: &str,
        identity: &str,
        block: Duration,
    ) -> Result<Option<Task>, ClientError>;

    /// Acknowledge a task; returns whether the task was still known.
    async fn complete_task(&self, task_queue: &str, task_id: &str) -> Result<bool, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_round_trip() {
        let errors = [
            ClientError::InvalidArgument("bad".to_string()),
            ClientError::NotFound("x".to_string()),
            ClientError::VersionMismatch,
            ClientError::EventRejected("out of order".to_string()),
            ClientError::ServiceNotRunning,
            ClientError::RateLimited,
        ];
        for err in errors {
            let rebuilt = ClientError::from_code(err.error_code(), &err.to_string());
            assert_eq!(rebuilt.error_code(), err.error_code());
        }
        assert_eq!(
            ClientError::from_code("SOMETHING_ELSE", "boom").error_code(),
            "TRANSPORT"
        );
    }
}
