// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! RPC message enums for the history and matching protocols.
//!
//! One variant per verb, mirroring the service surfaces. Every response
//! enum carries an `Error` variant with a stable code so clients can map
//! failures back onto `linkflow_api::ClientError`.

use serde::{Deserialize, Serialize};

use linkflow_api::command::{Command, Failure};
use linkflow_api::events::HistoryEvent;
use linkflow_api::execution::{ExecutionKey, MutableState};
use linkflow_api::task::Task;

/// Error payload carried in error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Requests understood by the history service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HistoryRequest {
    /// Record one event.
    RecordEvent {
        key: ExecutionKey,
        event: HistoryEvent,
    },
    /// Fetch events in an inclusive range; values ≤ 0 normalize.
    GetHistory {
        key: ExecutionKey,
        first_event_id: i64,
        last_event_id: i64,
    },
    /// Fetch the mutable-state snapshot.
    GetMutableState { key: ExecutionKey },
    /// Apply the driver's commands for a completed workflow task.
    RespondWorkflowTaskCompleted {
        key: ExecutionKey,
        task_token: Vec<u8>,
        commands: Vec<Command>,
    },
    /// Report a failed workflow task.
    RespondWorkflowTaskFailed {
        key: ExecutionKey,
        task_token: Vec<u8>,
        failure: Failure,
    },
    /// Report a completed activity.
    RespondActivityTaskCompleted {
        key: ExecutionKey,
        scheduled_event_id: i64,
        result: Vec<u8>,
    },
    /// Report a failed activity.
    RespondActivityTaskFailed {
        key: ExecutionKey,
        scheduled_event_id: i64,
        failure: Failure,
    },
}

/// Responses produced by the history service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HistoryResponse {
    /// Event committed under the given id.
    EventRecorded { event_id: i64 },
    /// Events for a `GetHistory`.
    History { events: Vec<HistoryEvent> },
    /// Snapshot for a `GetMutableState`.
    State { state: MutableState },
    /// Operation succeeded with nothing to return.
    Ack,
    /// Operation failed.
    Error(RpcError),
}

/// Requests understood by the matching service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MatchingRequest {
    /// Enqueue a task.
    AddTask { task_queue: String, task: Task },
    /// Long-poll for a task, blocking up to `block_ms` server-side.
    PollTask {
        task_queue: String,
        identity: String,
        block_ms: u64,
    },
    /// Acknowledge a task.
    CompleteTask { task_queue: String, task_id: String },
}

/// Responses produced by the matching service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MatchingResponse {
    /// Task accepted (or silently deduplicated).
    TaskAdded,
    /// Poll outcome; `None` when the block elapsed empty.
    Polled { task: Option<Task> },
    /// Completion outcome.
    Completed { found: bool },
    /// Operation failed.
    Error(RpcError),
}
