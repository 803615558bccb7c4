// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution identity and the mutable-state projection.
//!
//! [`MutableState`] is owned by the mutable-state store; callers always
//! receive a deep clone and hand a clone back for the CAS write. No
//! reference to a stored state ever escapes the store.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::HistoryEvent;

/// Identifies one run of a workflow: `(namespace, workflow, run)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionKey {
    /// Namespace the execution belongs to.
    pub namespace_id: String,
    /// Workflow identifier, stable across runs.
    pub workflow_id: String,
    /// Run identifier, unique per run.
    pub run_id: String,
}

impl ExecutionKey {
    /// Create a new execution key.
    pub fn new(
        namespace_id: impl Into<String>,
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace_id: namespace_id.into(),
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

impl std::fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.namespace_id, self.workflow_id, self.run_id
        )
    }
}

/// Lifecycle status of one execution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
pub enum ExecutionStatus {
    /// No `EXECUTION_STARTED` event applied yet.
    #[default]
    Unspecified,
    /// Execution is in progress.
    Running,
    /// Execution finished successfully.
    Completed,
    /// Execution finished with a failure.
    Failed,
    /// Execution was terminated externally.
    Terminated,
}

/// Core attributes of one execution, projected from history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    /// Namespace the execution belongs to.
    pub namespace_id: String,
    /// Workflow identifier.
    pub workflow_id: String,
    /// Run identifier.
    pub run_id: String,
    /// Registered workflow type name.
    pub workflow_type: String,
    /// Task queue decisions for this execution are dispatched to.
    pub task_queue: String,
    /// Input recorded at start.
    pub input: Vec<u8>,
    /// Overall execution timeout.
    pub execution_timeout: Duration,
    /// Single-run timeout.
    pub run_timeout: Duration,
    /// Per-task timeout.
    pub task_timeout: Duration,
    /// Current status.
    pub status: ExecutionStatus,
    /// When `EXECUTION_STARTED` was applied.
    pub start_time: Option<DateTime<Utc>>,
    /// When a terminal event was applied.
    pub close_time: Option<DateTime<Utc>>,
}

/// A pending activity, keyed by its scheduled event id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityInfo {
    /// Event id of the `ACTIVITY_SCHEDULED` event.
    pub scheduled_event_id: i64,
    /// Event id of the `ACTIVITY_STARTED` event, 0 until started.
    pub started_event_id: i64,
    /// Caller-assigned activity id.
    pub activity_id: String,
    /// Activity (node) type.
    pub activity_type: String,
    /// Task queue the activity was dispatched to.
    pub task_queue: String,
    /// Activity input.
    pub input: Vec<u8>,
    /// When the activity was scheduled.
    pub scheduled_time: Option<DateTime<Utc>>,
    /// When the activity was started.
    pub started_time: Option<DateTime<Utc>>,
    /// Current attempt, 1-based.
    pub attempt: i32,
    /// Heartbeat timeout.
    pub heartbeat_timeout: Duration,
    /// Schedule-to-close timeout.
    pub schedule_timeout: Duration,
    /// Start-to-close timeout.
    pub start_to_close: Duration,
    /// Last recorded heartbeat details.
    pub heartbeat_details: Vec<u8>,
}

/// A pending timer, keyed by its timer id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerInfo {
    /// Caller-assigned timer id.
    pub timer_id: String,
    /// Event id of the `TIMER_STARTED` event.
    pub started_event_id: i64,
    /// When the timer should fire.
    pub fire_time: Option<DateTime<Utc>>,
    /// When the timer expires.
    pub expiry_time: Option<DateTime<Utc>>,
}

/// Terminal result of one node, kept for successor input resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    /// Node id within the workflow definition.
    pub node_id: String,
    /// When the node reached a terminal state.
    pub completed_time: Option<DateTime<Utc>>,
    /// Output on success.
    pub output: Vec<u8>,
    /// Failure reason, empty on success.
    pub failure_reason: String,
    /// Failure details, empty on success.
    pub failure_details: Vec<u8>,
}

/// Retry policy attached to activity schedules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied per attempt.
    pub backoff_coefficient: f64,
    /// Upper bound on the computed delay.
    pub maximum_interval: Duration,
    /// Attempts after which retrying stops; 0 means unlimited.
    pub maximum_attempts: i32,
    /// Error types that are never retried.
    pub non_retryable_error_types: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: 3,
            non_retryable_error_types: Vec::new(),
        }
    }
}

/// Mutable-state projection for one execution.
///
/// Rebuilt deterministically by folding the engine's apply over history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutableState {
    /// Projected execution attributes.
    pub execution_info: ExecutionInfo,
    /// Next event id to be assigned, starts at 1.
    pub next_event_id: i64,
    /// Pending activities by scheduled event id.
    pub pending_activities: HashMap<i64, ActivityInfo>,
    /// Pending timers by timer id.
    pub pending_timers: HashMap<String, TimerInfo>,
    /// Terminal node results by node id.
    pub completed_nodes: HashMap<String, NodeResult>,
    /// Events awaiting a transactional flush.
    pub buffered_events: Vec<HistoryEvent>,
    /// Optimistic-concurrency token, bumped by the store on every update.
    pub db_version: i64,
}

impl MutableState {
    /// Create a fresh state anchored on an execution key.
    pub fn new(key: &ExecutionKey) -> Self {
        Self {
            execution_info: ExecutionInfo {
                namespace_id: key.namespace_id.clone(),
                workflow_id: key.workflow_id.clone(),
                run_id: key.run_id.clone(),
                ..Default::default()
            },
            next_event_id: 1,
            ..Default::default()
        }
    }

    /// Deep copy. All byte-slice fields (input, output, details, heartbeat)
    /// are owned `Vec<u8>`s, so a derived clone already copies them; this
    /// alias exists to keep call sites explicit about the ownership rule.
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }

    /// Whether the execution is currently running.
    pub fn is_running(&self) -> bool {
        self.execution_info.status == ExecutionStatus::Running
    }

    /// Allocate the next event id and advance the counter.
    pub fn increment_next_event_id(&mut self) -> i64 {
        let id = self.next_event_id;
        self.next_event_id += 1;
        id
    }

    /// Buffer an event for a transactional flush.
    pub fn add_buffered_event(&mut self, event: HistoryEvent) {
        self.buffered_events.push(event);
    }

    /// Drop all buffered events.
    pub fn clear_buffered_events(&mut self) {
        self.buffered_events.clear();
    }
}
