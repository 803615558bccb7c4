// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tasks as they travel through matching to workers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::ExecutionKey;

/// Default per-task execution timeout.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum TaskKind {
    /// A decision task: prompts the driver to advance the DAG.
    WorkflowTask,
    /// A unit of external work handed to a typed executor.
    ActivityTask,
}

/// One unit of work on a task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Queue-unique id; deduplication key.
    pub id: String,
    /// Opaque token echoed back on completion.
    pub token: Vec<u8>,
    /// Execution the task belongs to.
    pub key: ExecutionKey,
    /// Workflow or activity.
    pub kind: TaskKind,
    /// Node id, empty for workflow tasks.
    pub node_id: String,
    /// Node type, empty for workflow tasks.
    pub node_type: String,
    /// Input payload.
    pub input: Vec<u8>,
    /// Node configuration payload.
    pub config: Vec<u8>,
    /// Event id that scheduled this work.
    pub scheduled_event_id: i64,
    /// When the task was enqueued.
    pub scheduled_time: DateTime<Utc>,
    /// When the task was handed to a poller.
    pub started_time: Option<DateTime<Utc>>,
    /// Attempt, 1-based.
    pub attempt: i32,
    /// Per-task execution timeout.
    pub timeout: Duration,
}

impl Task {
    /// Deterministic id for a workflow (decision) task triggered by an event.
    pub fn workflow_task_id(key: &ExecutionKey, triggering_event_id: i64) -> String {
        format!(
            "{}:{}:wft:{}",
            key.workflow_id, key.run_id, triggering_event_id
        )
    }

    /// Deterministic id for an activity task.
    pub fn activity_task_id(key: &ExecutionKey, scheduled_event_id: i64, attempt: i32) -> String {
        format!(
            "{}:{}:act:{}:{}",
            key.workflow_id, key.run_id, scheduled_event_id, attempt
        )
    }
}

/// Decoded form of [`Task::token`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskToken {
    /// Execution the token belongs to.
    pub key: ExecutionKey,
    /// Event id that scheduled the work.
    pub scheduled_event_id: i64,
    /// Attempt, 1-based.
    pub attempt: i32,
}

impl TaskToken {
    /// Encode the token into opaque bytes.
    pub fn encode(&self) -> Vec<u8> {
        // Infallible for this shape; a corrupted token only ever fails decode.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decode a token previously produced by [`encode`](Self::encode).
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_are_deterministic() {
        let key = ExecutionKey::new("default", "w1", "r1");
        assert_eq!(Task::workflow_task_id(&key, 3), "w1:r1:wft:3");
        assert_eq!(Task::activity_task_id(&key, 2, 1), "w1:r1:act:2:1");
        assert_eq!(Task::activity_task_id(&key, 2, 2), "w1:r1:act:2:2");
    }

    #[test]
    fn test_task_token_round_trip() {
        let token = TaskToken {
            key: ExecutionKey::new("default", "w1", "r1"),
            scheduled_event_id: 5,
            attempt: 2,
        };
        let decoded = TaskToken::decode(&token.encode()).unwrap();
        assert_eq!(token, decoded);
        assert!(TaskToken::decode(b"not json").is_err());
    }
}
