// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Intake consumer retry and dead-letter behavior.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use linkflow_api::client::{ClientError, HistoryClient};
use linkflow_api::command::{Command, Failure};
use linkflow_api::events::HistoryEvent;
use linkflow_api::execution::{ExecutionKey, MutableState};
use linkflow_frontend::consumer::{
    ConsumerConfig, DlqEntry, DlqSink, IntakeConsumer, IntakeSource, StreamMessage,
};
use linkflow_frontend::service::FrontendService;

/// History client that fails every record a fixed number of times.
struct FailingHistory {
    failures_left: Mutex<u32>,
    recorded: Mutex<Vec<ExecutionKey>>,
}

impl FailingHistory {
    fn failing(times: u32) -> Self {
        Self {
            failures_left: Mutex::new(times),
            recorded: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HistoryClient for FailingHistory {
    async fn record_event(
        &self,
        key: &ExecutionKey,
        event: HistoryEvent,
    ) -> Result<i64, ClientError> {
        let mut failures_left = self.failures_left.lock().unwrap();
        if *failures_left > 0 {
            *failures_left -= 1;
            return Err(ClientError::Transport("history unavailable".to_string()));
        }
        self.recorded.lock().unwrap().push(key.clone());
        Ok(event.event_id)
    }

    async fn get_history(
        &self,
        _key: &ExecutionKey,
        _first_event_id: i64,
        _last_event_id: i64,
    ) -> Result<Vec<HistoryEvent>, ClientError> {
        Ok(Vec::new())
    }

    async fn get_mutable_state(&self, key: &ExecutionKey) -> Result<MutableState, ClientError> {
        Ok(MutableState::new(key))
    }

    async fn respond_workflow_task_completed(
        &self,
        _key: &ExecutionKey,
        _task_token: &[u8],
        _commands: Vec<Command>,
    ) -> Result<(), ClientError> {
        Ok(())
    }

    async fn respond_workflow_task_failed(
        &self,
        _key: &ExecutionKey,
        _task_token: &[u8],
        _failure: Failure,
    ) -> Result<(), ClientError> {
        Ok(())
    }

    async fn respond_activity_task_completed(
        &self,
        _key: &ExecutionKey,
        _scheduled_event_id: i64,
        _result: Vec<u8>,
    ) -> Result<(), ClientError> {
        Ok(())
    }

    async fn respond_activity_task_failed(
        &self,
        _key: &ExecutionKey,
        _scheduled_event_id: i64,
        _failure: Failure,
    ) -> Result<(), ClientError> {
        Ok(())
    }
}

#[derive(Default)]
struct MemorySource {
    acked: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl IntakeSource for MemorySource {
    async fn next(&self) -> Option<StreamMessage> {
        None
    }

    async fn ack(&self, stream: &str, message_id: &str) {
        self.acked
            .lock()
            .unwrap()
            .push((stream.to_string(), message_id.to_string()));
    }
}

#[derive(Default)]
struct MemoryDlq {
    entries: Mutex<Vec<DlqEntry>>,
}

#[async_trait]
impl DlqSink for MemoryDlq {
    async fn append(&self, entry: DlqEntry) -> Result<(), String> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

const JOB: &str = r#"{"job_id":"job-9","callback_token":"tok","execution_id":1,"workflow_id":42,"workspace_id":7,"priority":"default","workflow":{"nodes":[],"edges":[]},"trigger_data":{}}"#;

fn message() -> StreamMessage {
    StreamMessage {
        stream: "linkflow:jobs:partition:3".to_string(),
        id: "1700000000-0".to_string(),
        payload: JOB.to_string(),
    }
}

fn fast_config() -> ConsumerConfig {
    ConsumerConfig {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_exhausted_retries_dead_letter_the_payload() {
    let history = Arc::new(FailingHistory::failing(u32::MAX));
    let source = Arc::new(MemorySource::default());
    let dlq = Arc::new(MemoryDlq::default());
    let consumer = IntakeConsumer::new(
        source.clone(),
        dlq.clone(),
        Arc::new(FrontendService::new(history)),
        fast_config(),
    );

    consumer.process_message(message()).await;

    let entries = dlq.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.original_payload, JOB);
    assert_eq!(entry.original_stream, "linkflow:jobs:partition:3");
    assert_eq!(entry.original_msg_id, "1700000000-0");
    assert_eq!(entry.job_id, "job-9");
    assert_eq!(entry.attempt_count, 3);
    assert!(entry.failure_reason.contains("history unavailable"));
    // failed_at is a fresh UTC timestamp.
    assert!((chrono::Utc::now() - entry.failed_at).num_seconds() < 60);

    // The message was acknowledged despite dead-lettering.
    assert_eq!(source.acked.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_transient_failure_recovers_without_dlq() {
    // Two failures, then success: attempt 3 lands.
    let history = Arc::new(FailingHistory::failing(2));
    let source = Arc::new(MemorySource::default());
    let dlq = Arc::new(MemoryDlq::default());
    let consumer = IntakeConsumer::new(
        source.clone(),
        dlq.clone(),
        Arc::new(FrontendService::new(history.clone())),
        fast_config(),
    );

    consumer.process_message(message()).await;

    assert!(dlq.entries.lock().unwrap().is_empty());
    let recorded = history.recorded.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].namespace_id, "workspace-7");
    assert_eq!(recorded[0].workflow_id, "workflow-42");
}

#[tokio::test]
async fn test_unparseable_payload_is_acked_and_skipped() {
    let history = Arc::new(FailingHistory::failing(0));
    let source = Arc::new(MemorySource::default());
    let dlq = Arc::new(MemoryDlq::default());
    let consumer = IntakeConsumer::new(
        source.clone(),
        dlq.clone(),
        Arc::new(FrontendService::new(history)),
        fast_config(),
    );

    consumer
        .process_message(StreamMessage {
            stream: "s".to_string(),
            id: "1".to_string(),
            payload: "not json".to_string(),
        })
        .await;

    assert!(dlq.entries.lock().unwrap().is_empty());
    assert_eq!(source.acked.lock().unwrap().len(), 1);
}
