// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The embedded runtime: all services in one process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use linkflow_frontend::FrontendService;
use linkflow_history::service::ServiceConfig;
use linkflow_history::shard::ShardController;
use linkflow_history::store::{MemoryEventStore, MemoryMutableStateStore};
use linkflow_matching::service::{MatchingConfig, MatchingService};
use linkflow_worker::executor;
use linkflow_worker::retry::Policy;
use linkflow_worker::service::{WorkerConfig, WorkerService};

use crate::clients::{EmbeddedHistoryClient, EmbeddedMatchingClient};

/// Builder for an [`EngineRuntime`].
#[derive(Debug, Clone)]
pub struct EngineRuntimeBuilder {
    shard_count: u32,
    partition_count: u32,
    task_queues: Vec<String>,
    num_pollers: usize,
    poll_interval: Duration,
    poll_block: Duration,
    retry_policy: Policy,
    callback_secret: Option<String>,
}

impl Default for EngineRuntimeBuilder {
    fn default() -> Self {
        Self {
            shard_count: 16,
            partition_count: 4,
            task_queues: vec!["workflows-default".to_string()],
            num_pollers: 4,
            poll_interval: Duration::from_secs(1),
            poll_block: Duration::from_secs(5),
            retry_policy: Policy::default(),
            callback_secret: None,
        }
    }
}

impl EngineRuntimeBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of history shards.
    pub fn shard_count(mut self, shard_count: u32) -> Self {
        self.shard_count = shard_count;
        self
    }

    /// Number of matching partitions.
    pub fn partition_count(mut self, partition_count: u32) -> Self {
        self.partition_count = partition_count;
        self
    }

    /// Queues the worker polls.
    pub fn task_queues(mut self, task_queues: Vec<String>) -> Self {
        self.task_queues = task_queues;
        self
    }

    /// Pollers per queue.
    pub fn num_pollers(mut self, num_pollers: usize) -> Self {
        self.num_pollers = num_pollers;
        self
    }

    /// Minimum interval between polls.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Server-side block per poll.
    pub fn poll_block(mut self, poll_block: Duration) -> Self {
        self.poll_block = poll_block;
        self
    }

    /// Retry policy for activity attempts.
    pub fn retry_policy(mut self, retry_policy: Policy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Secret for callback signatures.
    pub fn callback_secret(mut self, secret: impl Into<String>) -> Self {
        self.callback_secret = Some(secret.into());
        self
    }

    /// Assemble the runtime. Nothing runs until [`EngineRuntime::start`].
    pub fn build(self) -> Result<EngineRuntime> {
        let matching = Arc::new(MatchingService::new(MatchingConfig {
            num_partitions: self.partition_count,
            ..Default::default()
        }));

        let history = Arc::new(linkflow_history::Service::new(ServiceConfig {
            shard_controller: Arc::new(ShardController::new(self.shard_count)),
            event_store: Arc::new(MemoryEventStore::new()),
            state_store: Arc::new(MemoryMutableStateStore::new()),
            matching: Some(Arc::new(EmbeddedMatchingClient::new(matching.clone()))),
            metrics: None,
        }));

        let history_client = Arc::new(EmbeddedHistoryClient::new(history.clone()));
        let matching_client = Arc::new(EmbeddedMatchingClient::new(matching.clone()));

        let worker = Arc::new(WorkerService::new(
            history_client.clone(),
            matching_client,
            executor::builtin_registry(),
            WorkerConfig {
                task_queues: self.task_queues,
                num_pollers: self.num_pollers,
                identity: format!("engine-{}", std::process::id()),
                poll_interval: self.poll_interval,
                poll_block: self.poll_block,
                retry_policy: self.retry_policy,
                callback_secret: self.callback_secret,
                callback_timeout: Duration::from_secs(10),
            },
        ));

        let frontend = Arc::new(FrontendService::new(history_client));

        Ok(EngineRuntime {
            history,
            matching,
            worker,
            frontend,
        })
    }
}

/// A fully wired single-process engine.
pub struct EngineRuntime {
    history: Arc<linkflow_history::Service>,
    matching: Arc<MatchingService>,
    worker: Arc<WorkerService>,
    frontend: Arc<FrontendService>,
}

impl EngineRuntime {
    /// Create a new builder.
    pub fn builder() -> EngineRuntimeBuilder {
        EngineRuntimeBuilder::new()
    }

    /// Start history and the worker pollers.
    pub async fn start(self) -> Result<Self> {
        self.history.start()?;
        self.worker.start()?;
        info!("engine runtime started");
        Ok(self)
    }

    /// Graceful shutdown: drain the worker first, then stop history.
    /// Pending tasks stay in their queues.
    pub async fn shutdown(&self) -> Result<()> {
        info!("engine runtime shutting down");
        self.worker.stop().await?;
        self.history.stop();
        info!("engine runtime shutdown complete");
        Ok(())
    }

    /// The history service.
    pub fn history(&self) -> &Arc<linkflow_history::Service> {
        &self.history
    }

    /// The matching service.
    pub fn matching(&self) -> &Arc<MatchingService> {
        &self.matching
    }

    /// The worker service.
    pub fn worker(&self) -> &Arc<WorkerService> {
        &self.worker
    }

    /// The frontend service.
    pub fn frontend(&self) -> &Arc<FrontendService> {
        &self.frontend
    }
}
