// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event builder: stamps version/task-id metadata onto new events.

use std::time::Duration;

use chrono::Utc;

use linkflow_api::command::Failure;
use linkflow_api::events::*;

/// Builds history events for one execution.
///
/// The builder never touches state; callers assign event ids from the
/// state's counter and commit through the service.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    version: i64,
    task_id: i64,
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self {
            version: 1,
            task_id: 0,
        }
    }
}

impl EventBuilder {
    /// Create a builder with default version (1) and task id (0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the failover version stamped onto events.
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Override the transfer task id stamped onto events.
    pub fn with_task_id(mut self, task_id: i64) -> Self {
        self.task_id = task_id;
        self
    }

    fn new_event(&self, event_id: i64, attributes: EventAttributes) -> HistoryEvent {
        HistoryEvent {
            event_id,
            event_type: attributes.event_type(),
            timestamp: Utc::now(),
            version: self.version,
            task_id: self.task_id,
            attributes,
        }
    }

    /// Build `EXECUTION_STARTED`.
    #[allow(clippy::too_many_arguments)]
    pub fn execution_started(
        &self,
        event_id: i64,
        workflow_type: &str,
        task_queue: &str,
        input: Vec<u8>,
        execution_timeout: Duration,
        run_timeout: Duration,
        task_timeout: Duration,
        initiator: &str,
    ) -> HistoryEvent {
        self.new_event(
            event_id,
            EventAttributes::ExecutionStarted(ExecutionStartedAttributes {
                workflow_type: workflow_type.to_string(),
                task_queue: task_queue.to_string(),
                input,
                execution_timeout,
                run_timeout,
                task_timeout,
                parent_execution: None,
                initiator: initiator.to_string(),
            }),
        )
    }

    /// Build `EXECUTION_COMPLETED`.
    pub fn execution_completed(&self, event_id: i64, result: Vec<u8>) -> HistoryEvent {
        self.new_event(
            event_id,
            EventAttributes::ExecutionCompleted(ExecutionCompletedAttributes { result }),
        )
    }

    /// Build `EXECUTION_FAILED`.
    pub fn execution_failed(&self, event_id: i64, failure: &Failure) -> HistoryEvent {
        self.new_event(
            event_id,
            EventAttributes::ExecutionFailed(ExecutionFailedAttributes {
                reason: failure.message.clone(),
                details: failure.details.clone(),
            }),
        )
    }

    /// Build `EXECUTION_TERMINATED`.
    pub fn execution_terminated(
        &self,
        event_id: i64,
        reason: &str,
        identity: &str,
    ) -> HistoryEvent {
        self.new_event(
            event_id,
            EventAttributes::ExecutionTerminated(ExecutionTerminatedAttributes {
                reason: reason.to_string(),
                identity: identity.to_string(),
            }),
        )
    }

    /// Build `NODE_SCHEDULED`.
    #[allow(clippy::too_many_arguments)]
    pub fn node_scheduled(
        &self,
        event_id: i64,
        node_id: &str,
        node_type: &str,
        input: Vec<u8>,
        config: Vec<u8>,
        task_queue: &str,
        attempt: i32,
    ) -> HistoryEvent {
        self.new_event(
            event_id,
            EventAttributes::NodeScheduled(NodeScheduledAttributes {
                node_id: node_id.to_string(),
                node_type: node_type.to_string(),
                input,
                config,
                task_queue: task_queue.to_string(),
                attempt,
            }),
        )
    }

    /// Build `NODE_COMPLETED`.
    pub fn node_completed(
        &self,
        event_id: i64,
        node_id: &str,
        scheduled_event_id: i64,
        started_event_id: i64,
        result: Vec<u8>,
    ) -> HistoryEvent {
        self.new_event(
            event_id,
            EventAttributes::NodeCompleted(NodeCompletedAttributes {
                node_id: node_id.to_string(),
                scheduled_event_id,
                started_event_id,
                result,
            }),
        )
    }

    /// Build `NODE_FAILED`.
    #[allow(clippy::too_many_arguments)]
    pub fn node_failed(
        &self,
        event_id: i64,
        node_id: &str,
        scheduled_event_id: i64,
        started_event_id: i64,
        reason: &str,
        details: Vec<u8>,
        retry_state: RetryState,
    ) -> HistoryEvent {
        self.new_event(
            event_id,
            EventAttributes::NodeFailed(NodeFailedAttributes {
                node_id: node_id.to_string(),
                scheduled_event_id,
                started_event_id,
                reason: reason.to_string(),
                details,
                retry_state,
            }),
        )
    }

    /// Build `ACTIVITY_SCHEDULED`.
    pub fn activity_scheduled(
        &self,
        event_id: i64,
        attrs: ActivityScheduledAttributes,
    ) -> HistoryEvent {
        self.new_event(event_id, EventAttributes::ActivityScheduled(attrs))
    }

    /// Build `ACTIVITY_COMPLETED`.
    pub fn activity_completed(
        &self,
        event_id: i64,
        scheduled_event_id: i64,
        started_event_id: i64,
        result: Vec<u8>,
    ) -> HistoryEvent {
        self.new_event(
            event_id,
            EventAttributes::ActivityCompleted(ActivityCompletedAttributes {
                scheduled_event_id,
                started_event_id,
                result,
            }),
        )
    }

    /// Build `ACTIVITY_FAILED`.
    pub fn activity_failed(
        &self,
        event_id: i64,
        scheduled_event_id: i64,
        started_event_id: i64,
        reason: &str,
        details: Vec<u8>,
        retry_state: RetryState,
    ) -> HistoryEvent {
        self.new_event(
            event_id,
            EventAttributes::ActivityFailed(ActivityFailedAttributes {
                scheduled_event_id,
                started_event_id,
                reason: reason.to_string(),
                details,
                retry_state,
            }),
        )
    }

    /// Build `SIGNAL_RECEIVED`.
    pub fn signal_received(
        &self,
        event_id: i64,
        signal_name: &str,
        input: Vec<u8>,
        identity: &str,
    ) -> HistoryEvent {
        self.new_event(
            event_id,
            EventAttributes::SignalReceived(SignalReceivedAttributes {
                signal_name: signal_name.to_string(),
                input,
                identity: identity.to_string(),
            }),
        )
    }
}
