// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The intake consumer: drain a job stream into workflow executions.
//!
//! Each message is a [`JobPayload`]. Starting the execution is retried
//! with exponential backoff; after `max_retries` failed attempts the
//! payload moves to the dead-letter sink with its provenance. Messages
//! are acknowledged either way so the stream drains.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use linkflow_api::workflow::JobPayload;

use crate::service::{FrontendService, StartWorkflowExecutionRequest};

/// Default attempts before dead-lettering.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default backoff base.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default backoff cap.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// One raw message from the intake stream.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    /// Stream the message arrived on.
    pub stream: String,
    /// Stream-assigned message id.
    pub id: String,
    /// The raw payload (JSON-encoded [`JobPayload`]).
    pub payload: String,
}

/// Source of intake messages. The production implementation reads Redis
/// streams; tests use an in-memory source.
#[async_trait]
pub trait IntakeSource: Send + Sync {
    /// Next message, blocking up to the implementation's read timeout.
    /// `None` when nothing arrived.
    async fn next(&self) -> Option<StreamMessage>;

    /// Acknowledge a processed message.
    async fn ack(&self, stream: &str, message_id: &str);
}

/// A dead-letter entry with full provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    /// The payload exactly as it arrived.
    pub original_payload: String,
    /// Stream the payload arrived on.
    pub original_stream: String,
    /// Stream-assigned id of the original message.
    pub original_msg_id: String,
    /// Intake job id.
    pub job_id: String,
    /// Why the last attempt failed.
    pub failure_reason: String,
    /// How many attempts were made.
    pub attempt_count: u32,
    /// When the payload was dead-lettered (UTC).
    pub failed_at: DateTime<Utc>,
}

/// Sink for dead-lettered payloads.
#[async_trait]
pub trait DlqSink: Send + Sync {
    /// Append one entry.
    async fn append(&self, entry: DlqEntry) -> Result<(), String>;
}

/// Consumer retry configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Attempts before dead-lettering.
    pub max_retries: u32,
    /// Backoff base (doubled per attempt).
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// Drains an intake source into workflow executions.
pub struct IntakeConsumer {
    source: Arc<dyn IntakeSource>,
    dlq: Arc<dyn DlqSink>,
    service: Arc<FrontendService>,
    config: ConsumerConfig,
}

impl IntakeConsumer {
    /// Create a consumer.
    pub fn new(
        source: Arc<dyn IntakeSource>,
        dlq: Arc<dyn DlqSink>,
        service: Arc<FrontendService>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            source,
            dlq,
            service,
            config,
        }
    }

    /// Run until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("intake consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                message = self.source.next() => {
                    if let Some(message) = message {
                        self.process_message(message).await;
                    }
                }
            }
        }
        info!("intake consumer stopped");
    }

    /// Process one message end to end, acknowledging it afterwards.
    pub async fn process_message(&self, message: StreamMessage) {
        let job: JobPayload = match serde_json::from_str(&message.payload) {
            Ok(job) => job,
            Err(err) => {
                error!(
                    stream = %message.stream,
                    message_id = %message.id,
                    error = %err,
                    "failed to parse intake payload"
                );
                self.source.ack(&message.stream, &message.id).await;
                return;
            }
        };

        info!(job_id = %job.job_id, "processing job");

        let priority = if job.priority.is_empty() {
            "default".to_string()
        } else {
            job.priority.clone()
        };
        let request = StartWorkflowExecutionRequest {
            namespace: format!("workspace-{}", job.workspace_id),
            workflow_id: format!("workflow-{}", job.workflow_id),
            workflow_type: "linkflow-workflow".to_string(),
            task_queue: format!("workflows-{priority}"),
            input: message.payload.as_bytes().to_vec(),
            request_id: job.job_id.clone(),
        };

        if let Err(reason) = self.start_with_retry(&request, &job).await {
            error!(
                job_id = %job.job_id,
                reason = %reason,
                "job failed after all retries, moved to DLQ"
            );
            let entry = DlqEntry {
                original_payload: message.payload.clone(),
                original_stream: message.stream.clone(),
                original_msg_id: message.id.clone(),
                job_id: job.job_id.clone(),
                failure_reason: reason,
                attempt_count: self.config.max_retries,
                failed_at: Utc::now(),
            };
            if let Err(err) = self.dlq.append(entry).await {
                error!(job_id = %job.job_id, error = %err, "failed to write DLQ entry");
            }
        }

        self.source.ack(&message.stream, &message.id).await;
    }

    async fn start_with_retry(
        &self,
        request: &StartWorkflowExecutionRequest,
        job: &JobPayload,
    ) -> Result<(), String> {
        let mut last_error = String::new();
        for attempt in 1..=self.config.max_retries {
            info!(
                job_id = %job.job_id,
                attempt,
                max_attempts = self.config.max_retries,
                "attempting to start workflow"
            );

            match self.service.start_workflow_execution(request).await {
                Ok(run_id) => {
                    info!(job_id = %job.job_id, run_id = %run_id, attempts = attempt, "started workflow execution");
                    return Ok(());
                }
                Err(err) => {
                    last_error = err.to_string();
                    warn!(
                        job_id = %job.job_id,
                        attempt,
                        error = %last_error,
                        "workflow start failed"
                    );
                }
            }

            if attempt < self.config.max_retries {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }
        Err(last_error)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.config.base_delay * 2u32.saturating_pow(attempt - 1);
        delay.min(self.config.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let consumer_config = ConsumerConfig {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        };
        let consumer = IntakeConsumer {
            source: Arc::new(NullSource),
            dlq: Arc::new(NullSink),
            service: Arc::new(FrontendService::new(Arc::new(NullHistory))),
            config: consumer_config,
        };
        assert_eq!(consumer.backoff(1), Duration::from_secs(1));
        assert_eq!(consumer.backoff(2), Duration::from_secs(2));
        assert_eq!(consumer.backoff(5), Duration::from_secs(16));
        assert_eq!(consumer.backoff(7), Duration::from_secs(30));
    }

    struct NullSource;

    #[async_trait]
    impl IntakeSource for NullSource {
        async fn next(&self) -> Option<StreamMessage> {
            None
        }
        async fn ack(&self, _stream: &str, _message_id: &str) {}
    }

    struct NullSink;

    #[async_trait]
    impl DlqSink for NullSink {
        async fn append(&self, _entry: DlqEntry) -> Result<(), String> {
            Ok(())
        }
    }

    struct NullHistory;

    #[async_trait]
    impl linkflow_api::client::HistoryClient for NullHistory {
        async fn record_event(
            &self,
            _key: &linkflow_api::execution::ExecutionKey,
            event: linkflow_api::events::HistoryEvent,
        ) -> Result<i64, linkflow_api::client::ClientError> {
            Ok(event.event_id)
        }

        async fn get_history(
            &self,
            _key: &linkflow_api::execution::ExecutionKey,
            _first_event_id: i64,
            _last_event_id: i64,
        ) -> Result<Vec<linkflow_api::events::HistoryEvent>, linkflow_api::client::ClientError>
        {
            Ok(Vec::new())
        }

        async fn get_mutable_state(
            &self,
            key: &linkflow_api::execution::ExecutionKey,
        ) -> Result<linkflow_api::execution::MutableState, linkflow_api::client::ClientError>
        {
            Ok(linkflow_api::execution::MutableState::new(key))
        }

        async fn respond_workflow_task_completed(
            &self,
            _key: &linkflow_api::execution::ExecutionKey,
            _task_token: &[u8],
            _commands: Vec<linkflow_api::command::Command>,
        ) -> Result<(), linkflow_api::client::ClientError> {
            Ok(())
        }

        async fn respond_workflow_task_failed(
            &self,
            _key: &linkflow_api::execution::ExecutionKey,
            _task_token: &[u8],
            _failure: linkflow_api::command::Failure,
        ) -> Result<(), linkflow_api::client::ClientError> {
            Ok(())
        }

        async fn respond_activity_task_completed(
            &self,
            _key: &linkflow_api::execution::ExecutionKey,
            _scheduled_event_id: i64,
            _result: Vec<u8>,
        ) -> Result<(), linkflow_api::client::ClientError> {
            Ok(())
        }

        async fn respond_activity_task_failed(
            &self,
            _key: &linkflow_api::execution::ExecutionKey,
            _scheduled_event_id: i64,
            _failure: linkflow_api::command::Failure,
        ) -> Result<(), linkflow_api::client::ClientError> {
            Ok(())
        }
    }
}
