// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! History events and their typed attribute variants.
//!
//! Every state transition of an execution is one [`HistoryEvent`] in an
//! append-only log. `attributes` is a tagged sum keyed by [`EventType`];
//! consumers match exhaustively instead of downcasting.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::{ExecutionKey, RetryPolicy};

/// Closed set of history event types.
///
/// Discriminants are stable: they are the `event_type` field of the
/// serialized form and must never be reordered.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[repr(i32)]
pub enum EventType {
    /// Execution entered `Running`. Always event id 1.
    ExecutionStarted = 1,
    /// Execution finished successfully.
    ExecutionCompleted = 2,
    /// Execution finished with a failure.
    ExecutionFailed = 3,
    /// Execution was terminated externally.
    ExecutionTerminated = 4,
    /// A workflow node was scheduled for execution.
    NodeScheduled = 5,
    /// A workflow node was picked up by a worker.
    NodeStarted = 6,
    /// A workflow node completed.
    NodeCompleted = 7,
    /// A workflow node failed.
    NodeFailed = 8,
    /// A timer was started.
    TimerStarted = 9,
    /// A timer fired.
    TimerFired = 10,
    /// A timer was canceled.
    TimerCanceled = 11,
    /// An activity was scheduled.
    ActivityScheduled = 12,
    /// An activity was picked up by a worker.
    ActivityStarted = 13,
    /// An activity completed.
    ActivityCompleted = 14,
    /// An activity failed.
    ActivityFailed = 15,
    /// An activity exceeded its timeout.
    ActivityTimedOut = 16,
    /// An external signal was received.
    SignalReceived = 17,
    /// A marker was recorded.
    MarkerRecorded = 18,
}

impl EventType {
    /// Wire discriminant of this event type.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Resolve a wire discriminant back to an event type.
    pub fn from_code(code: i32) -> Option<Self> {
        use EventType::*;
        Some(match code {
            1 => ExecutionStarted,
            2 => ExecutionCompleted,
            3 => ExecutionFailed,
            4 => ExecutionTerminated,
            5 => NodeScheduled,
            6 => NodeStarted,
            7 => NodeCompleted,
            8 => NodeFailed,
            9 => TimerStarted,
            10 => TimerFired,
            11 => TimerCanceled,
            12 => ActivityScheduled,
            13 => ActivityStarted,
            14 => ActivityCompleted,
            15 => ActivityFailed,
            16 => ActivityTimedOut,
            17 => SignalReceived,
            18 => MarkerRecorded,
            _ => return None,
        })
    }
}

/// Whether a failed node or activity may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RetryState {
    /// Retry per the execution's retry policy.
    #[default]
    Retryable,
    /// Terminal failure, never retried.
    NonRetryable,
    /// Timed out; retried unless policy says otherwise.
    Timeout,
}

/// One entry of the append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// 1-based, dense per execution.
    pub event_id: i64,
    /// Kind of transition this event records.
    pub event_type: EventType,
    /// When the event was built.
    pub timestamp: DateTime<Utc>,
    /// Failover version, 1 in a single-cluster deployment.
    pub version: i64,
    /// Transfer task id, 0 when unused.
    pub task_id: i64,
    /// Typed attributes for `event_type`.
    pub attributes: EventAttributes,
}

/// Typed attribute variants, one per event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventAttributes {
    /// `EXECUTION_STARTED`
    ExecutionStarted(ExecutionStartedAttributes),
    /// `EXECUTION_COMPLETED`
    ExecutionCompleted(ExecutionCompletedAttributes),
    /// `EXECUTION_FAILED`
    ExecutionFailed(ExecutionFailedAttributes),
    /// `EXECUTION_TERMINATED`
    ExecutionTerminated(ExecutionTerminatedAttributes),
    /// `NODE_SCHEDULED`
    NodeScheduled(NodeScheduledAttributes),
    /// `NODE_STARTED`
    NodeStarted(NodeStartedAttributes),
    /// `NODE_COMPLETED`
    NodeCompleted(NodeCompletedAttributes),
    /// `NODE_FAILED`
    NodeFailed(NodeFailedAttributes),
    /// `TIMER_STARTED`
    TimerStarted(TimerStartedAttributes),
    /// `TIMER_FIRED`
    TimerFired(TimerFiredAttributes),
    /// `TIMER_CANCELED`
    TimerCanceled(TimerCanceledAttributes),
    /// `ACTIVITY_SCHEDULED`
    ActivityScheduled(ActivityScheduledAttributes),
    /// `ACTIVITY_STARTED`
    ActivityStarted(ActivityStartedAttributes),
    /// `ACTIVITY_COMPLETED`
    ActivityCompleted(ActivityCompletedAttributes),
    /// `ACTIVITY_FAILED`
    ActivityFailed(ActivityFailedAttributes),
    /// `ACTIVITY_TIMED_OUT`
    ActivityTimedOut(ActivityTimedOutAttributes),
    /// `SIGNAL_RECEIVED`
    SignalReceived(SignalReceivedAttributes),
    /// `MARKER_RECORDED`
    MarkerRecorded(MarkerRecordedAttributes),
}

impl EventAttributes {
    /// The event type this variant belongs to.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::ExecutionStarted(_) => EventType::ExecutionStarted,
            Self::ExecutionCompleted(_) => EventType::ExecutionCompleted,
            Self::ExecutionFailed(_) => EventType::ExecutionFailed,
            Self::ExecutionTerminated(_) => EventType::ExecutionTerminated,
            Self::NodeScheduled(_) => EventType::NodeScheduled,
            Self::NodeStarted(_) => EventType::NodeStarted,
            Self::NodeCompleted(_) => EventType::NodeCompleted,
            Self::NodeFailed(_) => EventType::NodeFailed,
            Self::TimerStarted(_) => EventType::TimerStarted,
            Self::TimerFired(_) => EventType::TimerFired,
            Self::TimerCanceled(_) => EventType::TimerCanceled,
            Self::ActivityScheduled(_) => EventType::ActivityScheduled,
            Self::ActivityStarted(_) => EventType::ActivityStarted,
            Self::ActivityCompleted(_) => EventType::ActivityCompleted,
            Self::ActivityFailed(_) => EventType::ActivityFailed,
            Self::ActivityTimedOut(_) => EventType::ActivityTimedOut,
            Self::SignalReceived(_) => EventType::SignalReceived,
            Self::MarkerRecorded(_) => EventType::MarkerRecorded,
        }
    }
}

/// Attributes of `EXECUTION_STARTED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStartedAttributes {
    /// Registered workflow type name.
    pub workflow_type: String,
    /// Task queue decisions are dispatched to.
    pub task_queue: String,
    /// Execution input (the intake job payload).
    pub input: Vec<u8>,
    /// Overall execution timeout.
    pub execution_timeout: Duration,
    /// Single-run timeout.
    pub run_timeout: Duration,
    /// Per-task timeout.
    pub task_timeout: Duration,
    /// Parent execution for child workflows.
    pub parent_execution: Option<ExecutionKey>,
    /// Who started the execution.
    pub initiator: String,
}

/// Attributes of `EXECUTION_COMPLETED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCompletedAttributes {
    /// Final result payload.
    pub result: Vec<u8>,
}

/// Attributes of `EXECUTION_FAILED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailedAttributes {
    /// Failure reason.
    pub reason: String,
    /// Failure details.
    pub details: Vec<u8>,
}

/// Attributes of `EXECUTION_TERMINATED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTerminatedAttributes {
    /// Termination reason.
    pub reason: String,
    /// Identity of the terminator.
    pub identity: String,
}

/// Attributes of `NODE_SCHEDULED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeScheduledAttributes {
    /// Node id within the workflow definition.
    pub node_id: String,
    /// Node type, resolved against the executor registry.
    pub node_type: String,
    /// Node input.
    pub input: Vec<u8>,
    /// Node configuration from the definition.
    pub config: Vec<u8>,
    /// Task queue the node task is dispatched to.
    pub task_queue: String,
    /// Attempt, 1-based; > 1 on re-schedules.
    pub attempt: i32,
}

/// Attributes of `NODE_STARTED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStartedAttributes {
    /// Node id.
    pub node_id: String,
    /// Event id of the matching `NODE_SCHEDULED`.
    pub scheduled_event_id: i64,
    /// Worker identity.
    pub identity: String,
}

/// Attributes of `NODE_COMPLETED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeCompletedAttributes {
    /// Node id.
    pub node_id: String,
    /// Event id of the matching `NODE_SCHEDULED`.
    pub scheduled_event_id: i64,
    /// Event id of the matching `NODE_STARTED`, 0 when skipped.
    pub started_event_id: i64,
    /// Node output.
    pub result: Vec<u8>,
}

/// Attributes of `NODE_FAILED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeFailedAttributes {
    /// Node id.
    pub node_id: String,
    /// Event id of the matching `NODE_SCHEDULED`.
    pub scheduled_event_id: i64,
    /// Event id of the matching `NODE_STARTED`, 0 when skipped.
    pub started_event_id: i64,
    /// Failure reason.
    pub reason: String,
    /// Failure details.
    pub details: Vec<u8>,
    /// Whether the failure may be retried.
    pub retry_state: RetryState,
}

/// Attributes of `TIMER_STARTED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerStartedAttributes {
    /// Caller-assigned timer id.
    pub timer_id: String,
    /// Delay from start to fire.
    pub start_to_fire: Duration,
}

/// Attributes of `TIMER_FIRED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerFiredAttributes {
    /// Timer id.
    pub timer_id: String,
    /// Event id of the matching `TIMER_STARTED`.
    pub started_event_id: i64,
}

/// Attributes of `TIMER_CANCELED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerCanceledAttributes {
    /// Timer id.
    pub timer_id: String,
    /// Event id of the matching `TIMER_STARTED`.
    pub started_event_id: i64,
    /// Identity of the canceler.
    pub identity: String,
}

/// Attributes of `ACTIVITY_SCHEDULED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityScheduledAttributes {
    /// Caller-assigned activity id.
    pub activity_id: String,
    /// Activity type.
    pub activity_type: String,
    /// Task queue the activity is dispatched to.
    pub task_queue: String,
    /// Activity input.
    pub input: Vec<u8>,
    /// Schedule-to-close timeout.
    pub schedule_to_close: Duration,
    /// Schedule-to-start timeout.
    pub schedule_to_start: Duration,
    /// Start-to-close timeout.
    pub start_to_close: Duration,
    /// Heartbeat timeout.
    pub heartbeat_timeout: Duration,
    /// Retry policy, None for the execution default.
    pub retry_policy: Option<RetryPolicy>,
}

/// Attributes of `ACTIVITY_STARTED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStartedAttributes {
    /// Event id of the matching `ACTIVITY_SCHEDULED`.
    pub scheduled_event_id: i64,
    /// Worker identity.
    pub identity: String,
    /// Attempt, 1-based.
    pub attempt: i32,
}

/// Attributes of `ACTIVITY_COMPLETED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityCompletedAttributes {
    /// Event id of the matching `ACTIVITY_SCHEDULED`.
    pub scheduled_event_id: i64,
    /// Event id of the matching `ACTIVITY_STARTED`, 0 when skipped.
    pub started_event_id: i64,
    /// Activity output.
    pub result: Vec<u8>,
}

/// Attributes of `ACTIVITY_FAILED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityFailedAttributes {
    /// Event id of the matching `ACTIVITY_SCHEDULED`.
    pub scheduled_event_id: i64,
    /// Event id of the matching `ACTIVITY_STARTED`, 0 when skipped.
    pub started_event_id: i64,
    /// Failure reason.
    pub reason: String,
    /// Failure details.
    pub details: Vec<u8>,
    /// Whether the failure may be retried.
    pub retry_state: RetryState,
}

/// Attributes of `ACTIVITY_TIMED_OUT`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTimedOutAttributes {
    /// Event id of the matching `ACTIVITY_SCHEDULED`.
    pub scheduled_event_id: i64,
    /// Event id of the matching `ACTIVITY_STARTED`, 0 when skipped.
    pub started_event_id: i64,
    /// Which timeout elapsed.
    pub timeout_type: String,
}

/// Attributes of `SIGNAL_RECEIVED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalReceivedAttributes {
    /// Signal name.
    pub signal_name: String,
    /// Signal payload.
    pub input: Vec<u8>,
    /// Identity of the sender.
    pub identity: String,
}

/// Attributes of `MARKER_RECORDED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecordedAttributes {
    /// Marker name.
    pub marker_name: String,
    /// Named detail payloads.
    pub details: HashMap<String, Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_event_type_codes_round_trip() {
        for event_type in EventType::iter() {
            assert_eq!(EventType::from_code(event_type.code()), Some(event_type));
        }
        assert_eq!(EventType::from_code(0), None);
        assert_eq!(EventType::from_code(99), None);
    }

    #[test]
    fn test_attributes_report_matching_event_type() {
        let attrs = EventAttributes::NodeScheduled(NodeScheduledAttributes {
            node_id: "n1".to_string(),
            node_type: "http".to_string(),
            ..Default::default()
        });
        assert_eq!(attrs.event_type(), EventType::NodeScheduled);

        let attrs = EventAttributes::TimerFired(TimerFiredAttributes {
            timer_id: "t1".to_string(),
            started_event_id: 4,
        });
        assert_eq!(attrs.event_type(), EventType::TimerFired);
    }
}
