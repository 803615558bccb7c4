// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The mutable-state engine: event validation and apply rules.
//!
//! The engine is the only code allowed to mutate a [`MutableState`]. It
//! exposes two primitive operations, `validate` and `apply`, plus synthesis
//! helpers that build decision-output events (allocating the next event id,
//! stamping now, updating pending maps). Callers are responsible for
//! committing synthesized events through the stores.

use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use linkflow_api::events::{
    ActivityScheduledAttributes, EventAttributes, EventType, HistoryEvent, RetryState,
};
use linkflow_api::execution::{
    ActivityInfo, ExecutionStatus, MutableState, NodeResult, TimerInfo,
};

/// Engine rejections, surfaced to callers and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The event is structurally unusable.
    #[error("invalid event")]
    InvalidEvent,

    /// `event_id` does not equal the state's `next_event_id`.
    #[error("event out of order")]
    EventOutOfOrder,

    /// A timer with this id is already pending.
    #[error("duplicate timer")]
    DuplicateTimer,

    /// No pending timer with this id.
    #[error("timer not found")]
    TimerNotFound,

    /// No pending activity with this scheduled event id.
    #[error("activity not found")]
    ActivityNotFound,

    /// The execution is not running.
    #[error("workflow not running")]
    WorkflowNotRunning,

    /// The attributes do not match the event type.
    #[error("invalid event type")]
    InvalidEventType,
}

/// Validates events against state and applies them.
#[derive(Debug, Default)]
pub struct Engine;

impl Engine {
    /// Create a new engine.
    pub fn new() -> Self {
        Self
    }

    /// Validate then apply.
    pub fn process_event(
        &self,
        state: &mut MutableState,
        event: &HistoryEvent,
    ) -> Result<(), EngineError> {
        self.validate_event(state, event)?;
        self.apply_event(state, event)
    }

    /// Check an event against the current state without mutating it.
    pub fn validate_event(
        &self,
        state: &MutableState,
        event: &HistoryEvent,
    ) -> Result<(), EngineError> {
        if event.event_id != state.next_event_id {
            return Err(EngineError::EventOutOfOrder);
        }

        match event.event_type {
            EventType::ExecutionStarted => {
                if event.event_id != 1 {
                    return Err(EngineError::EventOutOfOrder);
                }
                Ok(())
            }
            EventType::ExecutionCompleted
            | EventType::ExecutionFailed
            | EventType::ExecutionTerminated => self.require_running(state),
            EventType::TimerStarted => {
                self.require_running(state)?;
                let EventAttributes::TimerStarted(attrs) = &event.attributes else {
                    return Err(EngineError::InvalidEventType);
                };
                if state.pending_timers.contains_key(&attrs.timer_id) {
                    return Err(EngineError::DuplicateTimer);
                }
                Ok(())
            }
            EventType::TimerFired | EventType::TimerCanceled => {
                self.require_running(state)?;
                let timer_id = match &event.attributes {
                    EventAttributes::TimerFired(a) => &a.timer_id,
                    EventAttributes::TimerCanceled(a) => &a.timer_id,
                    _ => return Err(EngineError::InvalidEventType),
                };
                if !state.pending_timers.contains_key(timer_id) {
                    return Err(EngineError::TimerNotFound);
                }
                Ok(())
            }
            EventType::ActivityScheduled => self.require_running(state),
            EventType::ActivityStarted => {
                self.require_running(state)?;
                let EventAttributes::ActivityStarted(attrs) = &event.attributes else {
                    return Err(EngineError::InvalidEventType);
                };
                if !state
                    .pending_activities
                    .contains_key(&attrs.scheduled_event_id)
                {
                    return Err(EngineError::ActivityNotFound);
                }
                Ok(())
            }
            EventType::ActivityCompleted
            | EventType::ActivityFailed
            | EventType::ActivityTimedOut => {
                self.require_running(state)?;
                let scheduled_event_id = match &event.attributes {
                    EventAttributes::ActivityCompleted(a) => a.scheduled_event_id,
                    EventAttributes::ActivityFailed(a) => a.scheduled_event_id,
                    EventAttributes::ActivityTimedOut(a) => a.scheduled_event_id,
                    _ => return Err(EngineError::InvalidEventType),
                };
                if !state.pending_activities.contains_key(&scheduled_event_id) {
                    return Err(EngineError::ActivityNotFound);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Apply an event, mutating pending maps and advancing `next_event_id`.
    ///
    /// Idempotent per `(state, event_id)` pair: an event the state has
    /// already absorbed is a no-op. Unknown event kinds only advance the
    /// counter.
    pub fn apply_event(
        &self,
        state: &mut MutableState,
        event: &HistoryEvent,
    ) -> Result<(), EngineError> {
        if event.event_id < state.next_event_id {
            debug!(event_id = event.event_id, "event already applied, skipping");
            return Ok(());
        }

        match &event.attributes {
            EventAttributes::ExecutionStarted(attrs) => {
                let info = &mut state.execution_info;
                info.workflow_type = attrs.workflow_type.clone();
                info.task_queue = attrs.task_queue.clone();
                info.input = attrs.input.clone();
                info.execution_timeout = attrs.execution_timeout;
                info.run_timeout = attrs.run_timeout;
                info.task_timeout = attrs.task_timeout;
                info.status = ExecutionStatus::Running;
                info.start_time = Some(event.timestamp);
            }
            EventAttributes::ExecutionCompleted(_) => {
                state.execution_info.status = ExecutionStatus::Completed;
                state.execution_info.close_time = Some(event.timestamp);
            }
            EventAttributes::ExecutionFailed(_) => {
                state.execution_info.status = ExecutionStatus::Failed;
                state.execution_info.close_time = Some(event.timestamp);
            }
            EventAttributes::ExecutionTerminated(_) => {
                state.execution_info.status = ExecutionStatus::Terminated;
                state.execution_info.close_time = Some(event.timestamp);
            }
            EventAttributes::NodeScheduled(_) | EventAttributes::NodeStarted(_) => {}
            EventAttributes::NodeCompleted(attrs) => {
                state.completed_nodes.insert(
                    attrs.node_id.clone(),
                    NodeResult {
                        node_id: attrs.node_id.clone(),
                        completed_time: Some(event.timestamp),
                        output: attrs.result.clone(),
                        ..Default::default()
                    },
                );
            }
            EventAttributes::NodeFailed(attrs) => {
                state.completed_nodes.insert(
                    attrs.node_id.clone(),
                    NodeResult {
                        node_id: attrs.node_id.clone(),
                        completed_time: Some(event.timestamp),
                        failure_reason: attrs.reason.clone(),
                        failure_details: attrs.details.clone(),
                        ..Default::default()
                    },
                );
            }
            EventAttributes::TimerStarted(attrs) => {
                let fire_time = event.timestamp
                    + chrono::Duration::from_std(attrs.start_to_fire)
                        .unwrap_or_else(|_| chrono::Duration::zero());
                state.pending_timers.insert(
                    attrs.timer_id.clone(),
                    TimerInfo {
                        timer_id: attrs.timer_id.clone(),
                        started_event_id: event.event_id,
                        fire_time: Some(fire_time),
                        expiry_time: Some(fire_time),
                    },
                );
            }
            EventAttributes::TimerFired(attrs) => {
                state.pending_timers.remove(&attrs.timer_id);
            }
            EventAttributes::TimerCanceled(attrs) => {
                state.pending_timers.remove(&attrs.timer_id);
            }
            EventAttributes::ActivityScheduled(attrs) => {
                state.pending_activities.insert(
                    event.event_id,
                    ActivityInfo {
                        scheduled_event_id: event.event_id,
                        activity_id: attrs.activity_id.clone(),
                        activity_type: attrs.activity_type.clone(),
                        task_queue: attrs.task_queue.clone(),
                        input: attrs.input.clone(),
                        scheduled_time: Some(event.timestamp),
                        heartbeat_timeout: attrs.heartbeat_timeout,
                        schedule_timeout: attrs.schedule_to_close,
                        start_to_close: attrs.start_to_close,
                        ..Default::default()
                    },
                );
            }
            EventAttributes::ActivityStarted(attrs) => {
                if let Some(info) = state.pending_activities.get_mut(&attrs.scheduled_event_id) {
                    info.started_event_id = event.event_id;
                    info.started_time = Some(event.timestamp);
                    info.attempt = attrs.attempt;
                }
            }
            EventAttributes::ActivityCompleted(attrs) => {
                state.pending_activities.remove(&attrs.scheduled_event_id);
            }
            EventAttributes::ActivityFailed(attrs) => {
                state.pending_activities.remove(&attrs.scheduled_event_id);
            }
            EventAttributes::ActivityTimedOut(attrs) => {
                state.pending_activities.remove(&attrs.scheduled_event_id);
            }
            EventAttributes::SignalReceived(_) | EventAttributes::MarkerRecorded(_) => {}
        }

        state.next_event_id = event.event_id + 1;
        Ok(())
    }

    fn require_running(&self, state: &MutableState) -> Result<(), EngineError> {
        if !state.is_running() {
            return Err(EngineError::WorkflowNotRunning);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Event synthesis for higher layers (decision outputs). Each allocates
    // the next event id, stamps now, and updates pending maps; the caller
    // commits the produced events through the stores.
    // ------------------------------------------------------------------

    /// Synthesize `NODE_SCHEDULED`.
    pub fn schedule_node(
        &self,
        state: &mut MutableState,
        node_id: &str,
        node_type: &str,
        input: Vec<u8>,
        config: Vec<u8>,
        task_queue: &str,
        attempt: i32,
    ) -> Result<HistoryEvent, EngineError> {
        self.require_running(state)?;
        let event_id = state.increment_next_event_id();
        Ok(HistoryEvent {
            event_id,
            event_type: EventType::NodeScheduled,
            timestamp: Utc::now(),
            version: 1,
            task_id: 0,
            attributes: EventAttributes::NodeScheduled(
                linkflow_api::events::NodeScheduledAttributes {
                    node_id: node_id.to_string(),
                    node_type: node_type.to_string(),
                    input,
                    config,
                    task_queue: task_queue.to_string(),
                    attempt,
                },
            ),
        })
    }

    /// Synthesize `NODE_COMPLETED` and record the node result.
    pub fn complete_node(
        &self,
        state: &mut MutableState,
        node_id: &str,
        scheduled_event_id: i64,
        started_event_id: i64,
        result: Vec<u8>,
    ) -> Result<HistoryEvent, EngineError> {
        self.require_running(state)?;
        let event_id = state.increment_next_event_id();
        let event = HistoryEvent {
            event_id,
            event_type: EventType::NodeCompleted,
            timestamp: Utc::now(),
            version: 1,
            task_id: 0,
            attributes: EventAttributes::NodeCompleted(
                linkflow_api::events::NodeCompletedAttributes {
                    node_id: node_id.to_string(),
                    scheduled_event_id,
                    started_event_id,
                    result: result.clone(),
                },
            ),
        };
        state.completed_nodes.insert(
            node_id.to_string(),
            NodeResult {
                node_id: node_id.to_string(),
                completed_time: Some(event.timestamp),
                output: result,
                ..Default::default()
            },
        );
        Ok(event)
    }

    /// Synthesize `NODE_FAILED` and record the node result.
    #[allow(clippy::too_many_arguments)]
    pub fn fail_node(
        &self,
        state: &mut MutableState,
        node_id: &str,
        scheduled_event_id: i64,
        started_event_id: i64,
        reason: &str,
        details: Vec<u8>,
        retry_state: RetryState,
    ) -> Result<HistoryEvent, EngineError> {
        self.require_running(state)?;
        let event_id = state.increment_next_event_id();
        let event = HistoryEvent {
            event_id,
            event_type: EventType::NodeFailed,
            timestamp: Utc::now(),
            version: 1,
            task_id: 0,
            attributes: EventAttributes::NodeFailed(linkflow_api::events::NodeFailedAttributes {
                node_id: node_id.to_string(),
                scheduled_event_id,
                started_event_id,
                reason: reason.to_string(),
                details: details.clone(),
                retry_state,
            }),
        };
        state.completed_nodes.insert(
            node_id.to_string(),
            NodeResult {
                node_id: node_id.to_string(),
                completed_time: Some(event.timestamp),
                failure_reason: reason.to_string(),
                failure_details: details,
                ..Default::default()
            },
        );
        Ok(event)
    }

    /// Synthesize `TIMER_STARTED` and add the pending timer.
    pub fn start_timer(
        &self,
        state: &mut MutableState,
        timer_id: &str,
        duration: Duration,
    ) -> Result<HistoryEvent, EngineError> {
        self.require_running(state)?;
        if state.pending_timers.contains_key(timer_id) {
            return Err(EngineError::DuplicateTimer);
        }

        let event_id = state.increment_next_event_id();
        let now = Utc::now();
        let fire_time =
            now + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        state.pending_timers.insert(
            timer_id.to_string(),
            TimerInfo {
                timer_id: timer_id.to_string(),
                started_event_id: event_id,
                fire_time: Some(fire_time),
                expiry_time: Some(fire_time),
            },
        );
        Ok(HistoryEvent {
            event_id,
            event_type: EventType::TimerStarted,
            timestamp: now,
            version: 1,
            task_id: 0,
            attributes: EventAttributes::TimerStarted(
                linkflow_api::events::TimerStartedAttributes {
                    timer_id: timer_id.to_string(),
                    start_to_fire: duration,
                },
            ),
        })
    }

    /// Synthesize `TIMER_FIRED` and drop the pending timer.
    pub fn fire_timer(
        &self,
        state: &mut MutableState,
        timer_id: &str,
    ) -> Result<HistoryEvent, EngineError> {
        self.require_running(state)?;
        let info = state
            .pending_timers
            .get(timer_id)
            .ok_or(EngineError::TimerNotFound)?;
        let started_event_id = info.started_event_id;

        let event_id = state.increment_next_event_id();
        state.pending_timers.remove(timer_id);
        Ok(HistoryEvent {
            event_id,
            event_type: EventType::TimerFired,
            timestamp: Utc::now(),
            version: 1,
            task_id: 0,
            attributes: EventAttributes::TimerFired(linkflow_api::events::TimerFiredAttributes {
                timer_id: timer_id.to_string(),
                started_event_id,
            }),
        })
    }

    /// Synthesize `TIMER_CANCELED` and drop the pending timer.
    pub fn cancel_timer(
        &self,
        state: &mut MutableState,
        timer_id: &str,
        identity: &str,
    ) -> Result<HistoryEvent, EngineError> {
        self.require_running(state)?;
        let info = state
            .pending_timers
            .get(timer_id)
            .ok_or(EngineError::TimerNotFound)?;
        let started_event_id = info.started_event_id;

        let event_id = state.increment_next_event_id();
        state.pending_timers.remove(timer_id);
        Ok(HistoryEvent {
            event_id,
            event_type: EventType::TimerCanceled,
            timestamp: Utc::now(),
            version: 1,
            task_id: 0,
            attributes: EventAttributes::TimerCanceled(
                linkflow_api::events::TimerCanceledAttributes {
                    timer_id: timer_id.to_string(),
                    started_event_id,
                    identity: identity.to_string(),
                },
            ),
        })
    }

    /// Synthesize `ACTIVITY_SCHEDULED` and add the pending activity.
    pub fn schedule_activity(
        &self,
        state: &mut MutableState,
        attrs: ActivityScheduledAttributes,
    ) -> Result<HistoryEvent, EngineError> {
        self.require_running(state)?;
        let event_id = state.increment_next_event_id();
        let now = Utc::now();
        state.pending_activities.insert(
            event_id,
            ActivityInfo {
                scheduled_event_id: event_id,
                activity_id: attrs.activity_id.clone(),
                activity_type: attrs.activity_type.clone(),
                task_queue: attrs.task_queue.clone(),
                input: attrs.input.clone(),
                scheduled_time: Some(now),
                heartbeat_timeout: attrs.heartbeat_timeout,
                schedule_timeout: attrs.schedule_to_close,
                start_to_close: attrs.start_to_close,
                ..Default::default()
            },
        );
        Ok(HistoryEvent {
            event_id,
            event_type: EventType::ActivityScheduled,
            timestamp: now,
            version: 1,
            task_id: 0,
            attributes: EventAttributes::ActivityScheduled(attrs),
        })
    }

    /// Synthesize `ACTIVITY_COMPLETED` and drop the pending activity.
    pub fn complete_activity(
        &self,
        state: &mut MutableState,
        scheduled_event_id: i64,
        started_event_id: i64,
        result: Vec<u8>,
    ) -> Result<HistoryEvent, EngineError> {
        self.require_running(state)?;
        if !state.pending_activities.contains_key(&scheduled_event_id) {
            return Err(EngineError::ActivityNotFound);
        }

        let event_id = state.increment_next_event_id();
        state.pending_activities.remove(&scheduled_event_id);
        Ok(HistoryEvent {
            event_id,
            event_type: EventType::ActivityCompleted,
            timestamp: Utc::now(),
            version: 1,
            task_id: 0,
            attributes: EventAttributes::ActivityCompleted(
                linkflow_api::events::ActivityCompletedAttributes {
                    scheduled_event_id,
                    started_event_id,
                    result,
                },
            ),
        })
    }

    /// Synthesize `ACTIVITY_FAILED` and drop the pending activity.
    pub fn fail_activity(
        &self,
        state: &mut MutableState,
        scheduled_event_id: i64,
        started_event_id: i64,
        reason: &str,
        details: Vec<u8>,
        retry_state: RetryState,
    ) -> Result<HistoryEvent, EngineError> {
        self.require_running(state)?;
        if !state.pending_activities.contains_key(&scheduled_event_id) {
            return Err(EngineError::ActivityNotFound);
        }

        let event_id = state.increment_next_event_id();
        state.pending_activities.remove(&scheduled_event_id);
        Ok(HistoryEvent {
            event_id,
            event_type: EventType::ActivityFailed,
            timestamp: Utc::now(),
            version: 1,
            task_id: 0,
            attributes: EventAttributes::ActivityFailed(
                linkflow_api::events::ActivityFailedAttributes {
                    scheduled_event_id,
                    started_event_id,
                    reason: reason.to_string(),
                    details,
                    retry_state,
                },
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkflow_api::events::*;
    use linkflow_api::execution::ExecutionKey;

    fn started_event() -> HistoryEvent {
        HistoryEvent {
            event_id: 1,
            event_type: EventType::ExecutionStarted,
            timestamp: Utc::now(),
            version: 1,
            task_id: 0,
            attributes: EventAttributes::ExecutionStarted(ExecutionStartedAttributes {
                workflow_type: "linkflow-workflow".to_string(),
                task_queue: "default".to_string(),
                input: b"{}".to_vec(),
                ..Default::default()
            }),
        }
    }

    fn running_state() -> MutableState {
        let key = ExecutionKey::new("default", "w1", "r1");
        let mut state = MutableState::new(&key);
        Engine::new()
            .process_event(&mut state, &started_event())
            .unwrap();
        state
    }

    fn event(event_id: i64, attributes: EventAttributes) -> HistoryEvent {
        HistoryEvent {
            event_id,
            event_type: attributes.event_type(),
            timestamp: Utc::now(),
            version: 1,
            task_id: 0,
            attributes,
        }
    }

    #[test]
    fn test_execution_started_enters_running() {
        let state = running_state();
        assert!(state.is_running());
        assert_eq!(state.next_event_id, 2);
        assert_eq!(state.execution_info.task_queue, "default");
        assert!(state.execution_info.start_time.is_some());
    }

    #[test]
    fn test_execution_started_must_be_event_one() {
        let key = ExecutionKey::new("default", "w1", "r1");
        let mut state = MutableState::new(&key);
        state.next_event_id = 2;
        let mut evt = started_event();
        evt.event_id = 2;
        assert_eq!(
            Engine::new().validate_event(&state, &evt),
            Err(EngineError::EventOutOfOrder)
        );
    }

    #[test]
    fn test_out_of_order_rejected() {
        let engine = Engine::new();
        let state = running_state();
        let evt = event(
            5,
            EventAttributes::ExecutionCompleted(ExecutionCompletedAttributes::default()),
        );
        assert_eq!(
            engine.validate_event(&state, &evt),
            Err(EngineError::EventOutOfOrder)
        );
    }

    #[test]
    fn test_terminal_events_require_running() {
        let engine = Engine::new();
        let key = ExecutionKey::new("default", "w1", "r1");
        let state = MutableState::new(&key);
        let evt = event(
            1,
            EventAttributes::ExecutionCompleted(ExecutionCompletedAttributes::default()),
        );
        assert_eq!(
            engine.validate_event(&state, &evt),
            Err(EngineError::WorkflowNotRunning)
        );
    }

    #[test]
    fn test_no_mutating_event_after_close() {
        let engine = Engine::new();
        let mut state = running_state();
        engine
            .process_event(
                &mut state,
                &event(
                    2,
                    EventAttributes::ExecutionCompleted(ExecutionCompletedAttributes::default()),
                ),
            )
            .unwrap();
        assert_eq!(state.execution_info.status, ExecutionStatus::Completed);

        let evt = event(
            3,
            EventAttributes::TimerStarted(TimerStartedAttributes {
                timer_id: "t1".to_string(),
                start_to_fire: Duration::from_secs(1),
            }),
        );
        assert_eq!(
            engine.validate_event(&state, &evt),
            Err(EngineError::WorkflowNotRunning)
        );
    }

    #[test]
    fn test_timer_lifecycle_and_duplicates() {
        let engine = Engine::new();
        let mut state = running_state();

        let start = event(
            2,
            EventAttributes::TimerStarted(TimerStartedAttributes {
                timer_id: "t1".to_string(),
                start_to_fire: Duration::from_secs(5),
            }),
        );
        engine.process_event(&mut state, &start).unwrap();
        assert!(state.pending_timers.contains_key("t1"));
        assert_eq!(state.pending_timers["t1"].started_event_id, 2);

        // Duplicate start rejected.
        let dup = event(
            3,
            EventAttributes::TimerStarted(TimerStartedAttributes {
                timer_id: "t1".to_string(),
                start_to_fire: Duration::from_secs(5),
            }),
        );
        assert_eq!(
            engine.validate_event(&state, &dup),
            Err(EngineError::DuplicateTimer)
        );

        // Fire drains the pending entry exactly once.
        let fired = event(
            3,
            EventAttributes::TimerFired(TimerFiredAttributes {
                timer_id: "t1".to_string(),
                started_event_id: 2,
            }),
        );
        engine.process_event(&mut state, &fired).unwrap();
        assert!(state.pending_timers.is_empty());

        // Firing an unknown timer is rejected.
        let again = event(
            4,
            EventAttributes::TimerFired(TimerFiredAttributes {
                timer_id: "t1".to_string(),
                started_event_id: 2,
            }),
        );
        assert_eq!(
            engine.validate_event(&state, &again),
            Err(EngineError::TimerNotFound)
        );
    }

    #[test]
    fn test_activity_lifecycle() {
        let engine = Engine::new();
        let mut state = running_state();

        let scheduled = event(
            2,
            EventAttributes::ActivityScheduled(ActivityScheduledAttributes {
                activity_id: "a1".to_string(),
                activity_type: "http".to_string(),
                task_queue: "default".to_string(),
                input: b"{}".to_vec(),
                ..Default::default()
            }),
        );
        engine.process_event(&mut state, &scheduled).unwrap();
        assert!(state.pending_activities.contains_key(&2));

        let started = event(
            3,
            EventAttributes::ActivityStarted(ActivityStartedAttributes {
                scheduled_event_id: 2,
                identity: "worker-1".to_string(),
                attempt: 1,
            }),
        );
        engine.process_event(&mut state, &started).unwrap();
        assert_eq!(state.pending_activities[&2].started_event_id, 3);
        assert_eq!(state.pending_activities[&2].attempt, 1);

        let completed = event(
            4,
            EventAttributes::ActivityCompleted(ActivityCompletedAttributes {
                scheduled_event_id: 2,
                started_event_id: 3,
                result: b"ok".to_vec(),
            }),
        );
        engine.process_event(&mut state, &completed).unwrap();
        assert!(state.pending_activities.is_empty());
        assert_eq!(state.next_event_id, 5);
    }

    #[test]
    fn test_activity_events_require_pending_entry() {
        let engine = Engine::new();
        let state = running_state();
        let evt = event(
            2,
            EventAttributes::ActivityStarted(ActivityStartedAttributes {
                scheduled_event_id: 42,
                identity: "worker-1".to_string(),
                attempt: 1,
            }),
        );
        assert_eq!(
            engine.validate_event(&state, &evt),
            Err(EngineError::ActivityNotFound)
        );
    }

    #[test]
    fn test_apply_is_idempotent_per_event_id() {
        let engine = Engine::new();
        let mut state = running_state();
        let completed = event(
            2,
            EventAttributes::NodeCompleted(NodeCompletedAttributes {
                node_id: "n1".to_string(),
                scheduled_event_id: 1,
                started_event_id: 0,
                result: b"one".to_vec(),
            }),
        );
        engine.apply_event(&mut state, &completed).unwrap();
        assert_eq!(state.next_event_id, 3);
        assert_eq!(state.completed_nodes["n1"].output, b"one");

        // Replaying the same event id does not mutate anything.
        let mut replay = completed.clone();
        if let EventAttributes::NodeCompleted(ref mut a) = replay.attributes {
            a.result = b"two".to_vec();
        }
        engine.apply_event(&mut state, &replay).unwrap();
        assert_eq!(state.next_event_id, 3);
        assert_eq!(state.completed_nodes["n1"].output, b"one");
    }

    #[test]
    fn test_signal_and_marker_only_advance_counter() {
        let engine = Engine::new();
        let mut state = running_state();
        let before = state.clone();

        let signal = event(
            2,
            EventAttributes::SignalReceived(SignalReceivedAttributes {
                signal_name: "approval".to_string(),
                input: Vec::new(),
                identity: "api".to_string(),
            }),
        );
        engine.process_event(&mut state, &signal).unwrap();
        assert_eq!(state.next_event_id, 3);
        assert_eq!(state.pending_activities, before.pending_activities);
        assert_eq!(state.completed_nodes, before.completed_nodes);
    }

    #[test]
    fn test_synthesized_events_allocate_dense_ids() {
        let engine = Engine::new();
        let mut state = running_state();

        let scheduled = engine
            .schedule_node(&mut state, "n1", "http", b"{}".to_vec(), Vec::new(), "default", 1)
            .unwrap();
        assert_eq!(scheduled.event_id, 2);

        let completed = engine
            .complete_node(&mut state, "n1", 2, 0, b"out".to_vec())
            .unwrap();
        assert_eq!(completed.event_id, 3);
        assert_eq!(state.completed_nodes["n1"].output, b"out");
        assert_eq!(state.next_event_id, 4);
    }

    #[test]
    fn test_synthesis_requires_running() {
        let engine = Engine::new();
        let key = ExecutionKey::new("default", "w1", "r1");
        let mut state = MutableState::new(&key);
        assert_eq!(
            engine
                .schedule_node(&mut state, "n1", "http", Vec::new(), Vec::new(), "q", 1)
                .unwrap_err(),
            EngineError::WorkflowNotRunning
        );
        assert_eq!(
            engine.start_timer(&mut state, "t1", Duration::from_secs(1)).unwrap_err(),
            EngineError::WorkflowNotRunning
        );
    }

    #[test]
    fn test_timer_synthesis_round_trip() {
        let engine = Engine::new();
        let mut state = running_state();

        engine
            .start_timer(&mut state, "t1", Duration::from_secs(30))
            .unwrap();
        assert_eq!(
            engine
                .start_timer(&mut state, "t1", Duration::from_secs(30))
                .unwrap_err(),
            EngineError::DuplicateTimer
        );

        let fired = engine.fire_timer(&mut state, "t1").unwrap();
        assert_eq!(fired.event_type, EventType::TimerFired);
        assert!(state.pending_timers.is_empty());
        assert_eq!(
            engine.cancel_timer(&mut state, "t1", "tester").unwrap_err(),
            EngineError::TimerNotFound
        );
    }

    #[test]
    fn test_activity_synthesis_round_trip() {
        let engine = Engine::new();
        let mut state = running_state();

        let scheduled = engine
            .schedule_activity(
                &mut state,
                ActivityScheduledAttributes {
                    activity_id: "a1".to_string(),
                    activity_type: "http".to_string(),
                    task_queue: "default".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(state.pending_activities.contains_key(&scheduled.event_id));

        let failed = engine
            .fail_activity(
                &mut state,
                scheduled.event_id,
                0,
                "boom",
                Vec::new(),
                RetryState::Retryable,
            )
            .unwrap();
        assert_eq!(failed.event_type, EventType::ActivityFailed);
        assert!(state.pending_activities.is_empty());

        assert_eq!(
            engine
                .complete_activity(&mut state, scheduled.event_id, 0, Vec::new())
                .unwrap_err(),
            EngineError::ActivityNotFound
        );
    }
}
