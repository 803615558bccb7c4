// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end scenarios through the embedded runtime.

use std::time::{Duration, Instant};

use linkflow_api::events::EventType;
use linkflow_api::execution::{ExecutionKey, ExecutionStatus};
use linkflow_engine::EngineRuntime;
use linkflow_frontend::StartWorkflowExecutionRequest;

const TASK_QUEUE: &str = "workflows-default";

fn fast_runtime_builder() -> linkflow_engine::EngineRuntimeBuilder {
    EngineRuntime::builder()
        .task_queues(vec![TASK_QUEUE.to_string()])
        .num_pollers(1)
        .poll_interval(Duration::from_millis(10))
        .poll_block(Duration::from_millis(100))
}

fn start_request(input: &str) -> StartWorkflowExecutionRequest {
    StartWorkflowExecutionRequest {
        namespace: "default".to_string(),
        workflow_id: "w1".to_string(),
        workflow_type: "linkflow-workflow".to_string(),
        task_queue: TASK_QUEUE.to_string(),
        input: input.as_bytes().to_vec(),
        request_id: "job-1".to_string(),
    }
}

async fn await_status(
    runtime: &EngineRuntime,
    key: &ExecutionKey,
    expected: ExecutionStatus,
    deadline: Duration,
) {
    let start = Instant::now();
    loop {
        if let Ok(state) = runtime.history().get_mutable_state(key).await {
            if state.execution_info.status == expected {
                return;
            }
        }
        if start.elapsed() > deadline {
            let state = runtime.history().get_mutable_state(key).await;
            panic!("execution never reached {expected:?}; state: {state:?}");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn test_happy_single_node_workflow() {
    let runtime = fast_runtime_builder().build().unwrap().start().await.unwrap();

    let input = r#"{"workflow":{"nodes":[{"id":"t","type":"trigger_manual"}],"edges":[]},"trigger_data":{}}"#;
    let run_id = runtime
        .frontend()
        .start_workflow_execution(&start_request(input))
        .await
        .unwrap();
    let key = ExecutionKey::new("default", "w1", run_id);

    await_status(&runtime, &key, ExecutionStatus::Completed, Duration::from_secs(10)).await;

    // The exact event sequence of the happy path.
    let events = runtime.history().get_history(&key, 0, 0).await.unwrap();
    let sequence: Vec<(i64, EventType)> =
        events.iter().map(|e| (e.event_id, e.event_type)).collect();
    assert_eq!(
        sequence,
        vec![
            (1, EventType::ExecutionStarted),
            (2, EventType::NodeScheduled),
            (3, EventType::NodeCompleted),
            (4, EventType::ExecutionCompleted),
        ]
    );

    // Pending maps drained, no residue.
    let state = runtime.history().get_mutable_state(&key).await.unwrap();
    assert!(state.pending_activities.is_empty());
    assert!(state.pending_timers.is_empty());
    assert_eq!(state.next_event_id, 5);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_linear_workflow_passes_outputs_downstream() {
    let runtime = fast_runtime_builder().build().unwrap().start().await.unwrap();

    let input = r#"{"workflow":{"nodes":[{"id":"t","type":"trigger_manual"},{"id":"d","type":"delay","data":{"duration_ms":10}}],"edges":[{"id":"e1","source":"t","target":"d"}]},"trigger_data":{"seed":42}}"#;
    let run_id = runtime
        .frontend()
        .start_workflow_execution(&start_request(input))
        .await
        .unwrap();
    let key = ExecutionKey::new("default", "w1", run_id);

    await_status(&runtime, &key, ExecutionStatus::Completed, Duration::from_secs(10)).await;

    let state = runtime.history().get_mutable_state(&key).await.unwrap();
    // The delay node passed the trigger's output through.
    let delay_result = &state.completed_nodes["d"];
    let output: serde_json::Value = serde_json::from_slice(&delay_result.output).unwrap();
    assert_eq!(output["seed"], 42);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failing_node_exhausts_retries_and_fails_workflow() {
    // "transform" is registered but terminally unimplemented, so the first
    // failure is non-retryable and the workflow fails.
    let runtime = fast_runtime_builder().build().unwrap().start().await.unwrap();

    let input = r#"{"workflow":{"nodes":[{"id":"t","type":"trigger_manual"},{"id":"x","type":"transform"}],"edges":[{"id":"e1","source":"t","target":"x"}]},"trigger_data":{}}"#;
    let run_id = runtime
        .frontend()
        .start_workflow_execution(&start_request(input))
        .await
        .unwrap();
    let key = ExecutionKey::new("default", "w1", run_id);

    await_status(&runtime, &key, ExecutionStatus::Failed, Duration::from_secs(10)).await;

    let events = runtime.history().get_history(&key, 0, 0).await.unwrap();
    let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert!(types.contains(&EventType::NodeFailed));
    assert_eq!(*types.last().unwrap(), EventType::ExecutionFailed);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_graceful_shutdown_with_parked_pollers() {
    let runtime = EngineRuntime::builder()
        .task_queues(vec![TASK_QUEUE.to_string()])
        .num_pollers(2)
        .poll_interval(Duration::from_millis(10))
        .poll_block(Duration::from_secs(5))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    // Let the pollers reach matching and park.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Tasks on a queue nobody polls survive shutdown.
    let idle_queue = runtime
        .matching()
        .get_or_create_task_queue("unpolled", linkflow_matching::queue::TaskQueueKind::Normal);
    for i in 0..3 {
        idle_queue.add_task(linkflow_api::task::Task {
            id: format!("t{i}"),
            token: Vec::new(),
            key: ExecutionKey::new("default", "w1", "r1"),
            kind: linkflow_api::task::TaskKind::ActivityTask,
            node_id: "n".to_string(),
            node_type: "http".to_string(),
            input: Vec::new(),
            config: Vec::new(),
            scheduled_event_id: 2,
            scheduled_time: chrono::Utc::now(),
            started_time: None,
            attempt: 1,
            timeout: Duration::from_secs(30),
        });
    }

    // Shutdown returns promptly even though pollers were parked inside a
    // 5-second block.
    let start = Instant::now();
    runtime.shutdown().await.unwrap();
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "shutdown took {:?}",
        start.elapsed()
    );

    // Nothing was lost.
    assert_eq!(idle_queue.pending_task_count(), 3);
    assert!(!runtime.worker().is_running());
    assert!(!runtime.history().is_running());
}

#[tokio::test]
async fn test_duplicate_task_add_through_the_stack() {
    let runtime = fast_runtime_builder().build().unwrap();

    let queue = runtime
        .matching()
        .get_or_create_task_queue("dedup", linkflow_matching::queue::TaskQueueKind::Normal);
    let task = linkflow_api::task::Task {
        id: "x".to_string(),
        token: Vec::new(),
        key: ExecutionKey::new("default", "w1", "r1"),
        kind: linkflow_api::task::TaskKind::ActivityTask,
        node_id: "n".to_string(),
        node_type: "http".to_string(),
        input: Vec::new(),
        config: Vec::new(),
        scheduled_event_id: 2,
        scheduled_time: chrono::Utc::now(),
        started_time: None,
        attempt: 1,
        timeout: Duration::from_secs(30),
    };
    assert!(queue.add_task(task.clone()));
    assert!(!queue.add_task(task));
    assert_eq!(queue.pending_task_count(), 1);

    let polled = queue.poll("tester").await.unwrap();
    assert_eq!(polled.id, "x");
    assert_eq!(queue.pending_task_count(), 0);
}
