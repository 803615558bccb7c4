// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The matching service: add-task, poll-task, complete-task.
//!
//! Queue resolution on the add and poll paths uses get-or-create so
//! pollers can arrive before any task exists. Only `complete_task`
//! requires a prior queue.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use linkflow_api::task::Task;

use crate::error::{MatchingError, Result};
use crate::partition::{PartitionManager, DEFAULT_PARTITION_COUNT, DEFAULT_REPLICAS};
use crate::queue::{TaskQueue, TaskQueueKind, DEFAULT_BURST, DEFAULT_RATE_LIMIT};

/// Configuration for the matching service.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Number of partitions (defaulted when 0).
    pub num_partitions: u32,
    /// Virtual nodes per partition on the hash ring (defaulted when 0).
    pub replicas: usize,
    /// Per-queue sustained rate limit (defaulted when 0).
    pub rate_limit: u32,
    /// Per-queue burst (defaulted when 0).
    pub burst: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            num_partitions: DEFAULT_PARTITION_COUNT,
            replicas: DEFAULT_REPLICAS,
            rate_limit: DEFAULT_RATE_LIMIT,
            burst: DEFAULT_BURST,
        }
    }
}

/// Task-queue matching.
pub struct MatchingService {
    partition_mgr: PartitionManager,
    task_queues: RwLock<HashMap<String, Arc<TaskQueue>>>,
    rate_limit: u32,
    burst: u32,
}

impl MatchingService {
    /// Create a matching service.
    pub fn new(config: MatchingConfig) -> Self {
        Self {
            partition_mgr: PartitionManager::new(config.num_partitions, config.replicas),
            task_queues: RwLock::new(HashMap::new()),
            rate_limit: config.rate_limit,
            burst: config.burst,
        }
    }

    /// Enqueue a task; a duplicate id is absorbed silently.
    pub async fn add_task(&self, task_queue_name: &str, task: Task) -> Result<()> {
        let queue = self.get_or_create_task_queue(task_queue_name, TaskQueueKind::Normal);
        if !queue.add_task(task) {
            warn!(task_queue = task_queue_name, "task already exists");
        }
        Ok(())
    }

    /// Long-poll a queue for one task. Parks until a task is handed over;
    /// cancellation is dropping the future (callers bound the wait with a
    /// timeout).
    pub async fn poll_task(&self, task_queue_name: &str, identity: &str) -> Result<Task> {
        let queue = self.get_or_create_task_queue(task_queue_name, TaskQueueKind::Normal);
        debug!(task_queue = task_queue_name, identity, "polling");
        queue.poll(identity).await
    }

    /// Acknowledge a task. Requires the queue to exist.
    pub async fn complete_task(&self, task_queue_name: &str, task_id: &str) -> Result<()> {
        let queue = self
            .task_queue(task_queue_name)
            .ok_or_else(|| MatchingError::TaskQueueNotFound(task_queue_name.to_string()))?;
        if !queue.complete_task(task_id) {
            return Err(MatchingError::TaskNotFound(task_id.to_string()));
        }
        Ok(())
    }

    /// Existing queue by name.
    pub fn task_queue(&self, name: &str) -> Option<Arc<TaskQueue>> {
        let queues = self.task_queues.read().unwrap_or_else(|e| e.into_inner());
        queues.get(name).cloned()
    }

    /// Queue by name, created lazily under its partition.
    pub fn get_or_create_task_queue(&self, name: &str, kind: TaskQueueKind) -> Arc<TaskQueue> {
        {
            let queues = self.task_queues.read().unwrap_or_else(|e| e.into_inner());
            if let Some(queue) = queues.get(name) {
                return queue.clone();
            }
        }

        let mut queues = self.task_queues.write().unwrap_or_else(|e| e.into_inner());
        if let Some(queue) = queues.get(name) {
            return queue.clone();
        }

        let partition = self.partition_mgr.partition_for_task_queue(name);
        let queue = partition.get_or_create_task_queue(name, kind, self.rate_limit, self.burst);
        queues.insert(name.to_string(), queue.clone());

        info!(
            name,
            partition = partition.id(),
            "created task queue"
        );

        queue
    }

    /// The partition manager (for introspection).
    pub fn partition_manager(&self) -> &PartitionManager {
        &self.partition_mgr
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use linkflow_api::execution::ExecutionKey;
    use linkflow_api::task::TaskKind;

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
    async fn test_add_then_poll() {
        let service = MatchingService::new(MatchingConfig::default());
        service.add_task("q", task("t1")).await.unwrap();
        let polled = service.poll_task("q", "w").await.unwrap();
        assert_eq!(polled.id, "t1");
    }

    #[tokio::test]
    async fn test_poller_can_arrive_before_tasks() {
        let service = Arc::new(MatchingService::new(MatchingConfig::default()));
        let poll = tokio::spawn({
            let service = service.clone();
            async move { service.poll_task("fresh", "w").await }
        });

        // The queue exists as soon as the poll registers.
        for _ in 0..100 {
            if service.task_queue("fresh").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        service.add_task("fresh", task("t1")).await.unwrap();
        assert_eq!(poll.await.unwrap().unwrap().id, "t1");
    }

    #[tokio::test]
    async fn test_complete_task_requires_queue() {
        let service = MatchingService::new(MatchingConfig::default());
        assert_eq!(
            service.complete_task("missing", "t").await.unwrap_err(),
            MatchingError::TaskQueueNotFound("missing".to_string())
        );

        service.add_task("q", task("t1")).await.unwrap();
        assert_eq!(
            service.complete_task("q", "nope").await.unwrap_err(),
            MatchingError::TaskNotFound("nope".to_string())
        );
        service.complete_task("q", "t1").await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_registry_is_shared_with_partition() {
        let service = MatchingService::new(MatchingConfig::default());
        let queue = service.get_or_create_task_queue("q", TaskQueueKind::Normal);
        let partition = service.partition_manager().partition_for_task_queue("q");
        let from_partition = partition.task_queue("q").unwrap();
        assert!(Arc::ptr_eq(&queue, &from_partition));
    }
}
