// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The history service: record pipeline, reads, and post-commit dispatch.
//!
//! `record_event` is the central write:
//!
//! 1. resolve the shard (routing/logging)
//! 2. load mutable state, synthesizing a fresh one for unknown keys
//! 3. capture `expected_version`
//! 4. validate + apply through the engine
//! 5. append to the event store (CAS)
//! 6. bump and CAS-write the state
//! 7. dispatch tasks to matching (post-commit; failures are logged and
//!    never fail the commit)
//!
//! A CAS conflict surfaces as a version mismatch and the caller retries
//! from step 2. The respond helpers that synthesize events retry that loop
//! internally.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use linkflow_api::client::MatchingClient;
use linkflow_api::command::{Command, Failure, FailureKind};
use linkflow_api::events::{EventAttributes, EventType, HistoryEvent, RetryState};
use linkflow_api::execution::{ExecutionKey, MutableState};
use linkflow_api::task::{Task, TaskKind, TaskToken, DEFAULT_TASK_TIMEOUT};

use crate::engine::Engine;
use crate::error::{HistoryError, Result};
use crate::events::EventBuilder;
use crate::shard::ShardController;
use crate::store::{EventStore, MutableStateStore, StoreError};

/// Attempts for the internal read-validate-append loop on CAS conflicts.
const CAS_RETRY_ATTEMPTS: usize = 5;

/// Observability hooks for the history service.
pub trait Metrics: Send + Sync {
    /// One event committed.
    fn record_event_recorded(&self, event_type: EventType);
    /// Events returned by a history read.
    fn record_events_retrieved(&self, count: usize);
    /// Latency of one service operation.
    fn record_service_latency(&self, operation: &str, elapsed: Duration);
}

/// Default no-op metrics.
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn record_event_recorded(&self, _event_type: EventType) {}
    fn record_events_retrieved(&self, _count: usize) {}
    fn record_service_latency(&self, _operation: &str, _elapsed: Duration) {}
}

/// Configuration for the history service.
pub struct ServiceConfig {
    /// Shard controller for key routing.
    pub shard_controller: Arc<ShardController>,
    /// Event log backend.
    pub event_store: Arc<dyn EventStore>,
    /// Mutable-state backend.
    pub state_store: Arc<dyn MutableStateStore>,
    /// Matching client for post-commit task dispatch; `None` disables
    /// dispatch (history still commits, a sweep has to reconcile).
    pub matching: Option<Arc<dyn MatchingClient>>,
    /// Metrics sink; defaults to a no-op.
    pub metrics: Option<Arc<dyn Metrics>>,
}

/// Workflow history management.
pub struct Service {
    shard_controller: Arc<ShardController>,
    event_store: Arc<dyn EventStore>,
    state_store: Arc<dyn MutableStateStore>,
    matching: Option<Arc<dyn MatchingClient>>,
    engine: Engine,
    builder: EventBuilder,
    metrics: Arc<dyn Metrics>,
    running: RwLock<bool>,
}

impl Service {
    /// Create a stopped service.
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            shard_controller: config.shard_controller,
            event_store: config.event_store,
            state_store: config.state_store,
            matching: config.matching,
            engine: Engine::new(),
            builder: EventBuilder::new(),
            metrics: config.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            running: RwLock::new(false),
        }
    }

    /// Start accepting operations.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.write().unwrap_or_else(|e| e.into_inner());
        if *running {
            return Err(HistoryError::AlreadyRunning);
        }
        info!("starting history service");
        *running = true;
        Ok(())
    }

    /// Stop the service and release all shards. Idempotent.
    pub fn stop(&self) {
        let mut running = self.running.write().unwrap_or_else(|e| e.into_inner());
        if !*running {
            return;
        }
        info!("stopping history service");
        self.shard_controller.stop();
        *running = false;
    }

    /// Whether the service accepts operations.
    pub fn is_running(&self) -> bool {
        *self.running.read().unwrap_or_else(|e| e.into_inner())
    }

    fn check_running(&self) -> Result<()> {
        if !self.is_running() {
            return Err(HistoryError::NotRunning);
        }
        Ok(())
    }

    /// The shard controller (for routing introspection).
    pub fn shard_controller(&self) -> &Arc<ShardController> {
        &self.shard_controller
    }

    /// Record one event. Returns the committed event id.
    pub async fn record_event(&self, key: &ExecutionKey, event: HistoryEvent) -> Result<i64> {
        let start = Instant::now();
        self.check_running()?;

        let shard = self.shard_controller.shard_for_execution(key);
        debug!(
            shard_id = shard.id(),
            execution = %key,
            event_id = event.event_id,
            event_type = %event.event_type,
            "recording event"
        );

        let mut state = self.load_or_new_state(key).await?;
        let expected_version = state.db_version;

        self.engine.process_event(&mut state, &event)?;

        self.event_store
            .append_events(key, std::slice::from_ref(&event), expected_version)
            .await?;

        state.db_version += 1;
        if let Err(err) = self
            .state_store
            .update_mutable_state(key, &state, expected_version)
            .await
        {
            warn!(execution = %key, error = %err, "failed to update mutable state after recording event");
            return Err(err.into());
        }

        self.metrics.record_event_recorded(event.event_type);
        self.dispatch_tasks(key, std::slice::from_ref(&event), &state)
            .await;
        self.metrics
            .record_service_latency("RecordEvent", start.elapsed());
        Ok(event.event_id)
    }

    /// Record a batch: validate + apply each, one atomic append, one state
    /// write.
    pub async fn record_events(&self, key: &ExecutionKey, events: Vec<HistoryEvent>) -> Result<()> {
        self.check_running()?;
        if events.is_empty() {
            return Ok(());
        }

        let _shard = self.shard_controller.shard_for_execution(key);

        let mut state = self.load_or_new_state(key).await?;
        let expected_version = state.db_version;

        for event in &events {
            self.engine.process_event(&mut state, event)?;
        }

        self.event_store
            .append_events(key, &events, expected_version)
            .await?;

        state.db_version += 1;
        if let Err(err) = self
            .state_store
            .update_mutable_state(key, &state, expected_version)
            .await
        {
            warn!(execution = %key, error = %err, "failed to update mutable state");
            return Err(err.into());
        }

        for event in &events {
            self.metrics.record_event_recorded(event.event_type);
        }
        self.dispatch_tasks(key, &events, &state).await;
        Ok(())
    }

    /// History read with range normalization: `first <= 0 -> 1`,
    /// `last <= 0 -> i64::MAX`.
    pub async fn get_history(
        &self,
        key: &ExecutionKey,
        first_event_id: i64,
        last_event_id: i64,
    ) -> Result<Vec<HistoryEvent>> {
        self.check_running()?;

        let first = if first_event_id <= 0 { 1 } else { first_event_id };
        let last = if last_event_id <= 0 {
            i64::MAX
        } else {
            last_event_id
        };

        let events = self.event_store.get_events(key, first, last).await?;
        self.metrics.record_events_retrieved(events.len());
        Ok(events)
    }

    /// Mutable-state snapshot.
    pub async fn get_mutable_state(&self, key: &ExecutionKey) -> Result<MutableState> {
        self.check_running()?;
        Ok(self.state_store.get_mutable_state(key).await?)
    }

    /// Apply the driver's commands for a completed workflow task.
    ///
    /// All commands commit in one atomic append; the read-validate-append
    /// loop retries internally on CAS conflicts.
    pub async fn respond_workflow_task_completed(
        &self,
        key: &ExecutionKey,
        task_token: &[u8],
        commands: Vec<Command>,
    ) -> Result<()> {
        self.check_running()?;
        self.validate_token(key, task_token)?;
        if commands.is_empty() {
            return Ok(());
        }

        let mut last_err = HistoryError::Store(StoreError::VersionMismatch);
        for _ in 0..CAS_RETRY_ATTEMPTS {
            let mut state = self.state_store.get_mutable_state(key).await?;
            let expected_version = state.db_version;

            let mut events = Vec::with_capacity(commands.len());
            for command in &commands {
                let event = self.event_for_command(&state, command);
                self.engine.process_event(&mut state, &event)?;
                events.push(event);
            }

            match self
                .event_store
                .append_events(key, &events, expected_version)
                .await
            {
                Ok(()) => {}
                Err(StoreError::VersionMismatch) => {
                    last_err = HistoryError::Store(StoreError::VersionMismatch);
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            state.db_version += 1;
            self.state_store
                .update_mutable_state(key, &state, expected_version)
                .await?;

            for event in &events {
                self.metrics.record_event_recorded(event.event_type);
            }
            self.dispatch_tasks(key, &events, &state).await;
            return Ok(());
        }
        Err(last_err)
    }

    /// Report a failed workflow task. The decision cannot progress, so the
    /// execution is closed with `EXECUTION_FAILED`.
    pub async fn respond_workflow_task_failed(
        &self,
        key: &ExecutionKey,
        task_token: &[u8],
        failure: Failure,
    ) -> Result<()> {
        self.check_running()?;
        self.validate_token(key, task_token)?;
        self.respond_workflow_task_completed(
            key,
            task_token,
            vec![Command::FailWorkflowExecution { failure }],
        )
        .await
    }

    /// Schedule an activity directly, outside the node DSL. Commits
    /// `ACTIVITY_SCHEDULED` (adding the pending-activity entry) and
    /// dispatches the activity task to the attributes' queue. Returns the
    /// scheduled event id, which the worker echoes back through the
    /// `respond_activity_task_*` surface.
    pub async fn schedule_activity(
        &self,
        key: &ExecutionKey,
        attrs: linkflow_api::events::ActivityScheduledAttributes,
    ) -> Result<i64> {
        self.check_running()?;
        if attrs.task_queue.is_empty() {
            return Err(HistoryError::InvalidArgument(
                "activity task queue is required".to_string(),
            ));
        }
        self.commit_one_with_retry(key, |state| {
            Ok(self.builder.activity_scheduled(state.next_event_id, attrs.clone()))
        })
        .await
    }

    /// Report a completed activity by its scheduling event id.
    ///
    /// A `NODE_SCHEDULED` origin records `NODE_COMPLETED`; an
    /// `ACTIVITY_SCHEDULED` origin records `ACTIVITY_COMPLETED`.
    pub async fn respond_activity_task_completed(
        &self,
        key: &ExecutionKey,
        scheduled_event_id: i64,
        result: Vec<u8>,
    ) -> Result<()> {
        self.check_running()?;
        let scheduled = self.find_scheduled_event(key, scheduled_event_id).await?;

        self.commit_one_with_retry(key, |state| match &scheduled.attributes {
            EventAttributes::NodeScheduled(attrs) => Ok(self.builder.node_completed(
                state.next_event_id,
                &attrs.node_id,
                scheduled_event_id,
                0,
                result.clone(),
            )),
            EventAttributes::ActivityScheduled(_) => Ok(self.builder.activity_completed(
                state.next_event_id,
                scheduled_event_id,
                0,
                result.clone(),
            )),
            _ => Err(HistoryError::InvalidArgument(format!(
                "event {scheduled_event_id} is not a schedule"
            ))),
        })
        .await
        .map(|_| ())
    }

    /// Report a failed activity by its scheduling event id.
    pub async fn respond_activity_task_failed(
        &self,
        key: &ExecutionKey,
        scheduled_event_id: i64,
        failure: Failure,
    ) -> Result<()> {
        self.check_running()?;
        let scheduled = self.find_scheduled_event(key, scheduled_event_id).await?;
        let retry_state = retry_state_for_failure(&failure);

        self.commit_one_with_retry(key, |state| match &scheduled.attributes {
            EventAttributes::NodeScheduled(attrs) => Ok(self.builder.node_failed(
                state.next_event_id,
                &attrs.node_id,
                scheduled_event_id,
                0,
                &failure.message,
                failure.details.clone(),
                retry_state,
            )),
            EventAttributes::ActivityScheduled(_) => Ok(self.builder.activity_failed(
                state.next_event_id,
                scheduled_event_id,
                0,
                &failure.message,
                failure.details.clone(),
                retry_state,
            )),
            _ => Err(HistoryError::InvalidArgument(format!(
                "event {scheduled_event_id} is not a schedule"
            ))),
        })
        .await
        .map(|_| ())
    }

    /// Reserved: replay history from an event and branch the execution.
    pub async fn reset_execution(
        &self,
        _key: &ExecutionKey,
        _reason: &str,
        _reset_event_id: i64,
    ) -> Result<String> {
        Err(HistoryError::Unimplemented("reset execution"))
    }

    async fn load_or_new_state(&self, key: &ExecutionKey) -> Result<MutableState> {
        match self.state_store.get_mutable_state(key).await {
            Ok(state) => Ok(state),
            Err(StoreError::ExecutionNotFound) => Ok(MutableState::new(key)),
            Err(err) => Err(err.into()),
        }
    }

    fn validate_token(&self, key: &ExecutionKey, task_token: &[u8]) -> Result<()> {
        if task_token.is_empty() {
            return Ok(());
        }
        let token = TaskToken::decode(task_token)
            .map_err(|e| HistoryError::InvalidArgument(format!("malformed task token: {e}")))?;
        if token.key != *key {
            return Err(HistoryError::InvalidArgument(
                "task token does not match execution".to_string(),
            ));
        }
        Ok(())
    }

    fn event_for_command(&self, state: &MutableState, command: &Command) -> HistoryEvent {
        let event_id = state.next_event_id;
        match command {
            Command::ScheduleNode {
                node_id,
                node_type,
                input,
                config,
                attempt,
            } => self.builder.node_scheduled(
                event_id,
                node_id,
                node_type,
                input.clone(),
                config.clone(),
                &state.execution_info.task_queue,
                *attempt,
            ),
            Command::CompleteWorkflowExecution { result } => {
                self.builder.execution_completed(event_id, result.clone())
            }
            Command::FailWorkflowExecution { failure } => {
                self.builder.execution_failed(event_id, failure)
            }
        }
    }

    async fn find_scheduled_event(
        &self,
        key: &ExecutionKey,
        scheduled_event_id: i64,
    ) -> Result<HistoryEvent> {
        let events = self
            .event_store
            .get_events(key, scheduled_event_id, scheduled_event_id)
            .await?;
        events
            .into_iter()
            .next()
            .ok_or(HistoryError::Store(StoreError::EventNotFound))
    }

    /// Commit one synthesized event with the internal CAS retry loop.
    /// Returns the committed event id.
    async fn commit_one_with_retry<F>(&self, key: &ExecutionKey, build: F) -> Result<i64>
    where
        F: Fn(&MutableState) -> Result<HistoryEvent>,
    {
        let mut last_err = HistoryError::Store(StoreError::VersionMismatch);
        for _ in 0..CAS_RETRY_ATTEMPTS {
            let mut state = self.state_store.get_mutable_state(key).await?;
            let expected_version = state.db_version;

            let event = build(&state)?;
            self.engine.process_event(&mut state, &event)?;

            match self
                .event_store
                .append_events(key, std::slice::from_ref(&event), expected_version)
                .await
            {
                Ok(()) => {}
                Err(StoreError::VersionMismatch) => {
                    last_err = HistoryError::Store(StoreError::VersionMismatch);
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            state.db_version += 1;
            self.state_store
                .update_mutable_state(key, &state, expected_version)
                .await?;

            self.metrics.record_event_recorded(event.event_type);
            self.dispatch_tasks(key, std::slice::from_ref(&event), &state)
                .await;
            return Ok(event.event_id);
        }
        Err(last_err)
    }

    /// Post-commit task dispatch. Pure routing; errors are logged and
    /// swallowed so they never unwind the commit.
    async fn dispatch_tasks(&self, key: &ExecutionKey, events: &[HistoryEvent], state: &MutableState) {
        let Some(matching) = &self.matching else {
            debug!(execution = %key, "no matching client configured, skipping dispatch");
            return;
        };

        for event in events {
            let Some((queue, task)) = task_for_event(key, event, state) else {
                continue;
            };
            if let Err(err) = matching.add_task(&queue, task).await {
                warn!(
                    execution = %key,
                    event_id = event.event_id,
                    task_queue = %queue,
                    error = %err,
                    "failed to dispatch task"
                );
            }
        }
    }
}

fn retry_state_for_failure(failure: &Failure) -> RetryState {
    match failure.kind {
        FailureKind::Timeout => RetryState::Timeout,
        _ if failure.retryable => RetryState::Retryable,
        _ => RetryState::NonRetryable,
    }
}

fn nonzero_or_default(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        DEFAULT_TASK_TIMEOUT
    } else {
        timeout
    }
}

/// Route one committed event to a task, or nothing.
///
/// `EXECUTION_STARTED` prompts the first decision; `NODE_SCHEDULED` and
/// `ACTIVITY_SCHEDULED` hand the work to an executor; completion and
/// failure events prompt the next decision.
pub fn task_for_event(
    key: &ExecutionKey,
    event: &HistoryEvent,
    state: &MutableState,
) -> Option<(String, Task)> {
    let workflow_task = |queue: &str, triggering_event_id: i64| {
        let token = TaskToken {
            key: key.clone(),
            scheduled_event_id: triggering_event_id,
            attempt: 1,
        };
        (
            queue.to_string(),
            Task {
                id: Task::workflow_task_id(key, triggering_event_id),
                token: token.encode(),
                key: key.clone(),
                kind: TaskKind::WorkflowTask,
                node_id: String::new(),
                node_type: String::new(),
                input: Vec::new(),
                config: Vec::new(),
                scheduled_event_id: triggering_event_id,
                scheduled_time: event.timestamp,
                started_time: None,
                attempt: 1,
                timeout: nonzero_or_default(state.execution_info.task_timeout),
            },
        )
    };

    match &event.attributes {
        EventAttributes::ExecutionStarted(attrs) => {
            Some(workflow_task(&attrs.task_queue, event.event_id))
        }
        EventAttributes::NodeScheduled(attrs) => {
            let token = TaskToken {
                key: key.clone(),
                scheduled_event_id: event.event_id,
                attempt: attrs.attempt,
            };
            Some((
                attrs.task_queue.clone(),
                Task {
                    id: Task::activity_task_id(key, event.event_id, attrs.attempt),
                    token: token.encode(),
                    key: key.clone(),
                    kind: TaskKind::ActivityTask,
                    node_id: attrs.node_id.clone(),
                    node_type: attrs.node_type.clone(),
                    input: attrs.input.clone(),
                    config: attrs.config.clone(),
                    scheduled_event_id: event.event_id,
                    scheduled_time: event.timestamp,
                    started_time: None,
                    attempt: attrs.attempt,
                    timeout: nonzero_or_default(state.execution_info.task_timeout),
                },
            ))
        }
        EventAttributes::ActivityScheduled(attrs) => {
            let token = TaskToken {
                key: key.clone(),
                scheduled_event_id: event.event_id,
                attempt: 1,
            };
            Some((
                attrs.task_queue.clone(),
                Task {
                    id: Task::activity_task_id(key, event.event_id, 1),
                    token: token.encode(),
                    key: key.clone(),
                    kind: TaskKind::ActivityTask,
                    node_id: attrs.activity_id.clone(),
                    node_type: attrs.activity_type.clone(),
                    input: attrs.input.clone(),
                    config: Vec::new(),
                    scheduled_event_id: event.event_id,
                    scheduled_time: event.timestamp,
                    started_time: None,
                    attempt: 1,
                    timeout: nonzero_or_default(attrs.start_to_close),
                },
            ))
        }
        EventAttributes::NodeCompleted(_)
        | EventAttributes::NodeFailed(_)
        | EventAttributes::ActivityCompleted(_)
        | EventAttributes::ActivityFailed(_) => {
            if !state.is_running() {
                return None;
            }
            Some(workflow_task(&state.execution_info.task_queue, event.event_id))
        }
        _ => None,
    }
}
