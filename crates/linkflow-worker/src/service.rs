// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The worker service: poller fan-out, task dispatch, graceful shutdown.
//!
//! For every configured queue the service runs N pollers. A received task
//! is dispatched by kind: workflow tasks run the replay driver and report
//! commands; activity tasks run a typed executor with a per-task timeout.
//! Shutdown flips the watch signal (parked polls return promptly), then
//! awaits every poll loop, which drains in-flight handlers.

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use linkflow_api::client::{HistoryClient, MatchingClient};
use linkflow_api::command::{Failure, FailureKind};
use linkflow_api::events::EventAttributes;
use linkflow_api::execution::ExecutionKey;
use linkflow_api::task::{Task, TaskKind};
use linkflow_api::workflow::JobPayload;

use crate::callback::{self, CallbackSender, CallbackStatus};
use crate::driver::WorkflowDriver;
use crate::executor::{ErrorKind, ExecuteRequest, Registry};
use crate::poller::{Poller, PollerConfig, TaskHandler, DEFAULT_POLL_BLOCK, DEFAULT_POLL_INTERVAL};
use crate::retry::Policy;

/// Configuration for the worker service.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queues to poll.
    pub task_queues: Vec<String>,
    /// Pollers per queue.
    pub num_pollers: usize,
    /// Base identity; pollers append an index.
    pub identity: String,
    /// Minimum interval between polls.
    pub poll_interval: Duration,
    /// Server-side block per poll.
    pub poll_block: Duration,
    /// Retry policy for activity attempts.
    pub retry_policy: Policy,
    /// Secret for callback signatures; `None` sends unsigned callbacks.
    pub callback_secret: Option<String>,
    /// Timeout per callback request.
    pub callback_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            task_queues: vec!["default".to_string()],
            num_pollers: 1,
            identity: "worker".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_block: DEFAULT_POLL_BLOCK,
            retry_policy: Policy::default(),
            callback_secret: None,
            callback_timeout: Duration::from_secs(10),
        }
    }
}

/// Errors from worker lifecycle operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    /// `start` on a running service.
    #[error("worker service is already running")]
    AlreadyRunning,

    /// `stop` on a stopped service.
    #[error("worker service is not running")]
    NotRunning,
}

/// The worker runtime.
pub struct WorkerService {
    inner: Arc<WorkerInner>,
    config: WorkerConfig,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    running: RwLock<bool>,
}

struct WorkerInner {
    history: Arc<dyn HistoryClient>,
    matching: Arc<dyn MatchingClient>,
    registry: Registry,
    driver: WorkflowDriver,
    retry_policy: Policy,
    callback: CallbackSender,
}

impl WorkerService {
    /// Create a stopped worker service.
    pub fn new(
        history: Arc<dyn HistoryClient>,
        matching: Arc<dyn MatchingClient>,
        registry: Registry,
        config: WorkerConfig,
    ) -> Self {
        let driver = WorkflowDriver::new(history.clone(), config.retry_policy.clone());
        let callback = CallbackSender::new(config.callback_secret.clone(), config.callback_timeout);
        Self {
            inner: Arc::new(WorkerInner {
                history,
                matching,
                registry,
                driver,
                retry_policy: config.retry_policy.clone(),
                callback,
            }),
            config,
            handles: Mutex::new(Vec::new()),
            shutdown_tx: Mutex::new(None),
            running: RwLock::new(false),
        }
    }

    /// Register an executor. Duplicate registration is an error.
    pub fn register_executor(
        &self,
        executor: Arc<dyn crate::executor::Executor>,
    ) -> Result<(), crate::executor::AlreadyRegistered> {
        let node_type = executor.node_type().to_string();
        self.inner.registry.register(executor)?;
        info!(node_type, "registered executor");
        Ok(())
    }

    /// Spawn all pollers.
    pub fn start(&self) -> Result<(), WorkerError> {
        let mut running = self.running.write().unwrap_or_else(|e| e.into_inner());
        if *running {
            return Err(WorkerError::AlreadyRunning);
        }
        *running = true;
        drop(running);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for queue in &self.config.task_queues {
            for i in 0..self.config.num_pollers.max(1) {
                let identity = if self.config.num_pollers > 1 {
                    format!("{}-{}", self.config.identity, i + 1)
                } else {
                    self.config.identity.clone()
                };
                let poller = Poller::new(
                    self.inner.matching.clone(),
                    PollerConfig {
                        task_queue: queue.clone(),
                        identity,
                        poll_interval: self.config.poll_interval,
                        poll_block: self.config.poll_block,
                    },
                );
                let handler: Arc<dyn TaskHandler> = self.inner.clone();
                let shutdown_rx = shutdown_rx.clone();
                handles.push(tokio::spawn(async move {
                    poller.run(handler, shutdown_rx).await;
                }));
            }
        }

        info!(
            queues = ?self.config.task_queues,
            pollers_per_queue = self.config.num_pollers.max(1),
            "worker service started"
        );
        Ok(())
    }

    /// Graceful shutdown: reject new polls, wait for in-flight handlers.
    pub async fn stop(&self) -> Result<(), WorkerError> {
        {
            let mut running = self.running.write().unwrap_or_else(|e| e.into_inner());
            if !*running {
                return Err(WorkerError::NotRunning);
            }
            *running = false;
        }

        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = tx.send(true);
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            handles.drain(..).collect()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "poller task panicked during shutdown");
            }
        }

        info!("worker service stopped");
        Ok(())
    }

    /// Whether the service is running.
    pub fn is_running(&self) -> bool {
        *self.running.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle one task directly. Test hook; production tasks arrive
    /// through the pollers.
    pub async fn handle_task(&self, task_queue: &str, task: Task) {
        self.inner.handle(task_queue, task).await;
    }
}

#[async_trait]
impl TaskHandler for WorkerInner {
    async fn handle(&self, task_queue: &str, task: Task) {
        let task_id = task.id.clone();
        match task.kind {
            TaskKind::WorkflowTask => self.process_workflow_task(&task).await,
            TaskKind::ActivityTask => self.process_activity_task(&task).await,
        }

        // Ack is best-effort; matching already removed dispatched tasks
        // from its pending index.
        if let Err(err) = self.matching.complete_task(task_queue, &task_id).await {
            debug!(task_id = %task_id, error = %err, "task ack skipped");
        }
    }
}

impl WorkerInner {
    async fn process_workflow_task(&self, task: &Task) {
        let key = &task.key;
        info!(execution = %key, "processing workflow task");
        let started_at = Instant::now();

        let payload = self.load_job_payload(key).await;

        let commands = match self.driver.drive(key).await {
            Ok(commands) => commands,
            Err(err) => {
                error!(execution = %key, error = %err, "workflow driver failed");
                let failure = Failure {
                    message: err.to_string(),
                    kind: FailureKind::Application,
                    retryable: false,
                    details: Vec::new(),
                };
                if let Err(respond_err) = self
                    .history
                    .respond_workflow_task_failed(key, &task.token, failure)
                    .await
                {
                    error!(execution = %key, error = %respond_err, "failed to report workflow task failure");
                }
                self.maybe_send_callback(
                    payload.as_ref(),
                    Some((CallbackStatus::Failed, Some(err.to_string()))),
                    started_at.elapsed(),
                )
                .await;
                return;
            }
        };

        let outcome = callback::status_from_commands(&commands);
        if let Err(err) = self
            .history
            .respond_workflow_task_completed(key, &task.token, commands)
            .await
        {
            error!(execution = %key, error = %err, "failed to respond workflow task completed");
            self.maybe_send_callback(
                payload.as_ref(),
                Some((CallbackStatus::Failed, Some(err.to_string()))),
                started_at.elapsed(),
            )
            .await;
            return;
        }

        self.maybe_send_callback(payload.as_ref(), outcome, started_at.elapsed())
            .await;
    }

    async fn process_activity_task(&self, task: &Task) {
        let key = &task.key;
        info!(
            execution = %key,
            node_id = %task.node_id,
            node_type = %task.node_type,
            attempt = task.attempt,
            "processing activity task"
        );

        // Backoff for retried attempts happens worker-side, before the
        // executor runs.
        if task.attempt > 1 {
            let delay = self.retry_policy.next_retry_delay(task.attempt - 1);
            debug!(execution = %key, delay_ms = delay.as_millis() as u64, "retry backoff");
            tokio::time::sleep(delay).await;
        }

        let Some(executor) = self.registry.get(&task.node_type) else {
            self.report_activity_failure(
                task,
                Failure {
                    message: format!("no executor found for node type: {}", task.node_type),
                    kind: FailureKind::Application,
                    retryable: false,
                    details: Vec::new(),
                },
            )
            .await;
            return;
        };

        let request = ExecuteRequest {
            node_type: task.node_type.clone(),
            node_id: task.node_id.clone(),
            workflow_id: key.workflow_id.clone(),
            run_id: key.run_id.clone(),
            namespace: key.namespace_id.clone(),
            config: task.config.clone(),
            input: task.input.clone(),
            attempt: task.attempt,
            timeout: task.timeout,
        };

        let result = tokio::time::timeout(task.timeout, executor.execute(&request)).await;
        match result {
            Err(_) => {
                self.report_activity_failure(
                    task,
                    Failure {
                        message: format!(
                            "activity timed out after {} ms",
                            task.timeout.as_millis()
                        ),
                        kind: FailureKind::Timeout,
                        retryable: true,
                        details: Vec::new(),
                    },
                )
                .await;
            }
            Ok(Err(system_err)) => {
                self.report_activity_failure(
                    task,
                    Failure {
                        message: system_err.to_string(),
                        kind: FailureKind::Activity,
                        retryable: true,
                        details: Vec::new(),
                    },
                )
                .await;
            }
            Ok(Ok(response)) => {
                if let Some(app_err) = response.error {
                    self.report_activity_failure(
                        task,
                        Failure {
                            message: app_err.message.clone(),
                            kind: if app_err.kind == ErrorKind::Timeout {
                                FailureKind::Timeout
                            } else {
                                FailureKind::Application
                            },
                            retryable: app_err.kind != ErrorKind::NonRetryable,
                            details: Vec::new(),
                        },
                    )
                    .await;
                    return;
                }

                if let Err(err) = self
                    .history
                    .respond_activity_task_completed(key, task.scheduled_event_id, response.output)
                    .await
                {
                    error!(execution = %key, error = %err, "failed to report activity completion");
                }
            }
        }
    }

    async fn report_activity_failure(&self, task: &Task, failure: Failure) {
        warn!(
            execution = %task.key,
            node_id = %task.node_id,
            reason = %failure.message,
            "activity failed"
        );
        if let Err(err) = self
            .history
            .respond_activity_task_failed(&task.key, task.scheduled_event_id, failure)
            .await
        {
            error!(execution = %task.key, error = %err, "failed to report activity failure");
        }
    }

    /// Fetch the intake payload from the start event, for callbacks.
    async fn load_job_payload(&self, key: &ExecutionKey) -> Option<JobPayload> {
        let events = match self.history.get_history(key, 0, 0).await {
            Ok(events) => events,
            Err(err) => {
                warn!(execution = %key, error = %err, "failed to load callback payload");
                return None;
            }
        };
        events.iter().find_map(|event| match &event.attributes {
            EventAttributes::ExecutionStarted(attrs) => serde_json::from_slice(&attrs.input).ok(),
            _ => None,
        })
    }

    async fn maybe_send_callback(
        &self,
        payload: Option<&JobPayload>,
        outcome: Option<(CallbackStatus, Option<String>)>,
        duration: Duration,
    ) {
        let (Some(payload), Some((status, error_message))) = (payload, outcome) else {
            return;
        };
        self.callback
            .send(payload, status, duration, error_message)
            .await;
    }
}
