// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Long-poll loop: fetch tasks from matching, hand them to a handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use linkflow_api::client::{ClientError, MatchingClient};
use linkflow_api::task::Task;

/// Default minimum interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default server-side block per poll.
pub const DEFAULT_POLL_BLOCK: Duration = Duration::from_secs(5);

const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// Receives tasks from a poller. The handler runs synchronously inside
/// the poll loop and is responsible for reporting completion.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Handle one task from `task_queue`.
    async fn handle(&self, task_queue: &str, task: Task);
}

/// Configuration for one poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// The queue to poll.
    pub task_queue: String,
    /// Stable identity reported to matching.
    pub identity: String,
    /// Minimum interval between polls.
    pub poll_interval: Duration,
    /// Server-side block per poll.
    pub poll_block: Duration,
}

/// A single long-poll loop.
pub struct Poller {
    matching: Arc<dyn MatchingClient>,
    config: PollerConfig,
}

impl Poller {
    /// Create a poller.
    pub fn new(matching: Arc<dyn MatchingClient>, config: PollerConfig) -> Self {
        Self { matching, config }
    }

    /// The poller's identity.
    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    /// Run until `shutdown` flips to true. A task in the handler finishes
    /// before the loop observes shutdown; a parked poll is abandoned
    /// promptly.
    pub async fn run(&self, handler: Arc<dyn TaskHandler>, mut shutdown: watch::Receiver<bool>) {
        info!(
            task_queue = %self.config.task_queue,
            identity = %self.config.identity,
            "poller started"
        );

        let mut consecutive_errors: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            // Minimum interval between polls, raised after repeated errors.
            let pause = if consecutive_errors == 0 {
                self.config.poll_interval
            } else {
                (self.config.poll_interval * 2u32.saturating_pow(consecutive_errors))
                    .min(MAX_ERROR_BACKOFF)
            };
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(pause) => {}
            }

            let poll = self.matching.poll_task(
                &self.config.task_queue,
                &self.config.identity,
                self.config.poll_block,
            );
            tokio::select! {
                _ = shutdown.changed() => break,
                result = poll => match result {
                    Ok(Some(task)) => {
                        consecutive_errors = 0;
                        debug!(task_id = %task.id, "task received");
                        handler.handle(&self.config.task_queue, task).await;
                    }
                    Ok(None) => {
                        consecutive_errors = 0;
                    }
                    Err(ClientError::RateLimited) => {
                        consecutive_errors = consecutive_errors.saturating_add(1);
                        warn!(
                            task_queue = %self.config.task_queue,
                            "poll rate limited, backing off"
                        );
                    }
                    Err(err) => {
                        consecutive_errors = consecutive_errors.saturating_add(1);
                        error!(
                            task_queue = %self.config.task_queue,
                            error = %err,
                            "poll failed"
                        );
                    }
                }
            }
        }

        info!(
            task_queue = %self.config.task_queue,
            identity = %self.config.identity,
            "poller stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use linkflow_api::execution::ExecutionKey;
    use linkflow_api::task::TaskKind;

    struct QueueOnce {
        task: Mutex<Option<Task>>,
    }

    #[async_trait]
    impl MatchingClient for QueueOnce {
        async fn add_task(&self, _task_queue: &str, _task: Task) -> Result<(), ClientError> {
            Ok(())
        }

        async fn poll_task(
            &self,
            _task_queue: &str,
            _identity: &str,
            _block: Duration,
        ) -> Result<Option<Task>, ClientError> {
            Ok(self.task.lock().unwrap().take())
        }

        async fn complete_task(
            &self,
            _task_queue: &str,
            _task_id: &str,
        ) -> Result<bool, ClientError> {
            Ok(true)
        }
    }

    struct Collector {
        handled: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TaskHandler for Collector {
        async fn handle(&self, _task_queue: &str, task: Task) {
            self.handled.lock().unwrap().push(task.id);
        }
    }

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            token: Vec::new(),
            key: ExecutionKey::new("default", "w1", "r1"),
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

    #[tokio::test]
    async fn test_poller_delivers_then_stops() {
        let matching = Arc::new(QueueOnce {
            task: Mutex::new(Some(task("t1"))),
        });
        let handler = Arc::new(Collector {
            handled: Mutex::new(Vec::new()),
        });

        let poller = Poller::new(
            matching,
            PollerConfig {
                task_queue: "q".to_string(),
                identity: "worker-1".to_string(),
                poll_interval: Duration::from_millis(10),
                poll_block: Duration::from_millis(10),
            },
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let run = tokio::spawn({
            let handler = handler.clone();
            async move { poller.run(handler, shutdown_rx).await }
        });

        // Give the loop a few ticks to deliver.
        for _ in 0..100 {
            if !handler.handled.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        run.await.unwrap();

        assert_eq!(*handler.handled.lock().unwrap(), vec!["t1".to_string()]);
    }
}
