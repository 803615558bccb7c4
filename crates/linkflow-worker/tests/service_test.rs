// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker-service task handling against mock history/matching clients.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use linkflow_api::client::{ClientError, HistoryClient, MatchingClient};
use linkflow_api::command::{Command, Failure, FailureKind};
use linkflow_api::events::*;
use linkflow_api::execution::{ExecutionKey, MutableState};
use linkflow_api::task::{Task, TaskKind};
use linkflow_worker::executor::{
    ExecuteRequest, ExecuteResponse, ExecutionError, Executor, Registry,
};
use linkflow_worker::service::{WorkerConfig, WorkerService};

/// Everything the worker reported back to history.
#[derive(Debug, Clone)]
enum Reported {
    WorkflowCompleted(Vec<Command>),
    WorkflowFailed(Failure),
    ActivityCompleted(i64, Vec<u8>),
    ActivityFailed(i64, Failure),
}

struct MockHistory {
    events: Vec<HistoryEvent>,
    reported: Mutex<Vec<Reported>>,
}

impl MockHistory {
    fn new(events: Vec<HistoryEvent>) -> Self {
        Self {
            events,
            reported: Mutex::new(Vec::new()),
        }
    }

    fn reported(&self) -> Vec<Reported> {
        self.reported.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryClient for MockHistory {
    async fn record_event(
        &self,
        _key: &ExecutionKey,
        event: HistoryEvent,
    ) -> Result<i64, ClientError> {
        Ok(event.event_id)
    }

    async fn get_history(
        &self,
        _key: &ExecutionKey,
        _first_event_id: i64,
        _last_event_id: i64,
    ) -> Result<Vec<HistoryEvent>, ClientError> {
        Ok(self.events.clone())
    }

    async fn get_mutable_state(&self, key: &ExecutionKey) -> Result<MutableState, ClientError> {
        Ok(MutableState::new(key))
    }

    async fn respond_workflow_task_completed(
        &self,
        _key: &ExecutionKey,
        _task_token: &[u8],
        commands: Vec<Command>,
    ) -> Result<(), ClientError> {
        self.reported
            .lock()
            .unwrap()
            .push(Reported::WorkflowCompleted(commands));
        Ok(())
    }

    async fn respond_workflow_task_failed(
        &self,
        _key: &ExecutionKey,
        _task_token: &[u8],
        failure: Failure,
    ) -> Result<(), ClientError> {
        self.reported
            .lock()
            .unwrap()
            .push(Reported::WorkflowFailed(failure));
        Ok(())
    }

    async fn respond_activity_task_completed(
        &self,
        _key: &ExecutionKey,
        scheduled_event_id: i64,
        result: Vec<u8>,
    ) -> Result<(), ClientError> {
        self.reported
            .lock()
            .unwrap()
            .push(Reported::ActivityCompleted(scheduled_event_id, result));
        Ok(())
    }

    async fn respond_activity_task_failed(
        &self,
        _key: &ExecutionKey,
        scheduled_event_id: i64,
        failure: Failure,
    ) -> Result<(), ClientError> {
        self.reported
            .lock()
            .unwrap()
            .push(Reported::ActivityFailed(scheduled_event_id, failure));
        Ok(())
    }
}

#[derive(Default)]
struct MockMatching {
    completed: Mutex<Vec<String>>,
}

#[async_trait]
impl MatchingClient for MockMatching {
    async fn add_task(&self, _task_queue: &str, _task: Task) -> Result<(), ClientError> {
        Ok(())
    }

    async fn poll_task(
        &self,
        _task_queue: &str,
        _identity: &str,
        _block: Duration,
    ) -> Result<Option<Task>, ClientError> {
        Ok(None)
    }

    async fn complete_task(&self, _task_queue: &str, task_id: &str) -> Result<bool, ClientError> {
        self.completed.lock().unwrap().push(task_id.to_string());
        Ok(true)
    }
}

struct FlakyExecutor;

#[async_trait]
impl Executor for FlakyExecutor {
    fn node_type(&self) -> &str {
        "flaky"
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, ExecutionError> {
        if request.attempt < 2 {
            Ok(ExecuteResponse::failed(
                ExecutionError::retryable("server error: status 500"),
                Vec::new(),
                Duration::ZERO,
            ))
        } else {
            Ok(ExecuteResponse {
                output: b"{\"ok\":true}".to_vec(),
                ..Default::default()
            })
        }
    }
}

struct SlowExecutor;

#[async_trait]
impl Executor for SlowExecutor {
    fn node_type(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _request: &ExecuteRequest) -> Result<ExecuteResponse, ExecutionError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(ExecuteResponse::default())
    }
}

fn key() -> ExecutionKey {
    ExecutionKey::new("default", "w1", "r1")
}

fn started_history(input: &str) -> Vec<HistoryEvent> {
    vec![HistoryEvent {
        event_id: 1,
        event_type: EventType::ExecutionStarted,
        timestamp: Utc::now(),
        version: 1,
        task_id: 0,
        attributes: EventAttributes::ExecutionStarted(ExecutionStartedAttributes {
            workflow_type: "linkflow-workflow".to_string(),
            task_queue: "workflows-default".to_string(),
            input: input.as_bytes().to_vec(),
            ..Default::default()
        }),
    }]
}

fn workflow_task() -> Task {
    Task {
        id: "w1:r1:wft:1".to_string(),
        token: Vec::new(),
        key: key(),
        kind: TaskKind::WorkflowTask,
        node_id: String::new(),
        node_type: String::new(),
        input: Vec::new(),
        config: Vec::new(),
        scheduled_event_id: 1,
        scheduled_time: Utc::now(),
        started_time: None,
        attempt: 1,
        timeout: Duration::from_secs(30),
    }
}

fn activity_task(node_type: &str, attempt: i32, timeout: Duration) -> Task {
    Task {
        id: format!("w1:r1:act:2:{attempt}"),
        token: Vec::new(),
        key: key(),
        kind: TaskKind::ActivityTask,
        node_id: "n1".to_string(),
        node_type: node_type.to_string(),
        input: b"{}".to_vec(),
        config: Vec::new(),
        scheduled_event_id: 2,
        scheduled_time: Utc::now(),
        started_time: None,
        attempt,
        timeout,
    }
}

fn service(history: Arc<MockHistory>, matching: Arc<MockMatching>) -> WorkerService {
    let registry = Registry::new();
    registry.register(Arc::new(FlakyExecutor)).unwrap();
    registry.register(Arc::new(SlowExecutor)).unwrap();
    WorkerService::new(
        history,
        matching,
        registry,
        WorkerConfig {
            retry_policy: linkflow_worker::retry::Policy {
                initial_interval: Duration::from_millis(1),
                ..Default::default()
            },
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_workflow_task_reports_driver_commands() {
    let history = Arc::new(MockHistory::new(started_history(
        r#"{"workflow":{"nodes":[{"id":"t","type":"trigger_manual"}],"edges":[]},"trigger_data":{}}"#,
    )));
    let matching = Arc::new(MockMatching::default());
    let svc = service(history.clone(), matching.clone());

    svc.handle_task("workflows-default", workflow_task()).await;

    let reported = history.reported();
    assert_eq!(reported.len(), 1);
    match &reported[0] {
        Reported::WorkflowCompleted(commands) => {
            assert!(matches!(
                commands.as_slice(),
                [Command::ScheduleNode { node_id, .. }] if node_id == "t"
            ));
        }
        other => panic!("unexpected report: {other:?}"),
    }

    // The task was acked back to matching.
    assert_eq!(
        *matching.completed.lock().unwrap(),
        vec!["w1:r1:wft:1".to_string()]
    );
}

#[tokio::test]
async fn test_workflow_task_with_broken_payload_fails() {
    let history = Arc::new(MockHistory::new(started_history("garbage")));
    let matching = Arc::new(MockMatching::default());
    let svc = service(history.clone(), matching);

    svc.handle_task("workflows-default", workflow_task()).await;

    // The driver turns a broken payload into a FailWorkflowExecution
    // command, which the worker reports as a completed decision.
    let reported = history.reported();
    match &reported[0] {
        Reported::WorkflowCompleted(commands) => {
            assert!(matches!(
                commands.as_slice(),
                [Command::FailWorkflowExecution { .. }]
            ));
        }
        other => panic!("unexpected report: {other:?}"),
    }
}

#[tokio::test]
async fn test_activity_retryable_failure_then_success() {
    let history = Arc::new(MockHistory::new(started_history("{}")));
    let matching = Arc::new(MockMatching::default());
    let svc = service(history.clone(), matching);

    // Attempt 1 fails with a retryable application error.
    svc.handle_task("q", activity_task("flaky", 1, Duration::from_secs(5)))
        .await;
    match &history.reported()[0] {
        Reported::ActivityFailed(2, failure) => {
            assert_eq!(failure.kind, FailureKind::Application);
            assert!(failure.retryable);
            assert_eq!(failure.message, "server error: status 500");
        }
        other => panic!("unexpected report: {other:?}"),
    }

    // Attempt 2 (with the worker-side backoff) succeeds.
    svc.handle_task("q", activity_task("flaky", 2, Duration::from_secs(5)))
        .await;
    match &history.reported()[1] {
        Reported::ActivityCompleted(2, output) => {
            assert_eq!(output, b"{\"ok\":true}");
        }
        other => panic!("unexpected report: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_executor_is_a_terminal_failure() {
    let history = Arc::new(MockHistory::new(started_history("{}")));
    let matching = Arc::new(MockMatching::default());
    let svc = service(history.clone(), matching);

    svc.handle_task("q", activity_task("unregistered", 1, Duration::from_secs(5)))
        .await;

    match &history.reported()[0] {
        Reported::ActivityFailed(2, failure) => {
            assert!(!failure.retryable);
            assert!(failure.message.contains("unregistered"));
        }
        other => panic!("unexpected report: {other:?}"),
    }
}

#[tokio::test]
async fn test_activity_timeout_is_reported() {
    let history = Arc::new(MockHistory::new(started_history("{}")));
    let matching = Arc::new(MockMatching::default());
    let svc = service(history.clone(), matching);

    svc.handle_task("q", activity_task("slow", 1, Duration::from_millis(50)))
        .await;

    match &history.reported()[0] {
        Reported::ActivityFailed(2, failure) => {
            assert_eq!(failure.kind, FailureKind::Timeout);
            assert!(failure.retryable);
        }
        other => panic!("unexpected report: {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_executor_registration_rejected() {
    let history = Arc::new(MockHistory::new(Vec::new()));
    let matching = Arc::new(MockMatching::default());
    let svc = service(history, matching);
    assert!(svc.register_executor(Arc::new(FlakyExecutor)).is_err());
}

#[tokio::test]
async fn test_start_stop_lifecycle() {
    let history = Arc::new(MockHistory::new(Vec::new()));
    let matching = Arc::new(MockMatching::default());
    let svc = service(history, matching);

    svc.start().unwrap();
    assert!(svc.is_running());
    assert!(svc.start().is_err());

    svc.stop().await.unwrap();
    assert!(!svc.is_running());
    assert!(svc.stop().await.is_err());
}
