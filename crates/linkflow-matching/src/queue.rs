// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! A named task queue: FIFO with dedup, rate limiting, and parked pollers.
//!
//! `add_task` prefers a direct hand-off to the oldest parked poller over
//! queueing; this preempts the pending queue to minimize latency and does
//! not violate FIFO for any single producer (the pending queue is only
//! non-empty when no poller is parked).
//!
//! Poll cancellation is future drop. Parking and unparking always happen
//! under the queue lock: a drop guard removes the parked entry, so an
//! abandoned poll can never leak a slot.

use std::collections::{HashSet, VecDeque};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::oneshot;

use linkflow_api::task::Task;

use crate::error::MatchingError;

/// Default sustained poll rate per queue (tokens per second).
pub const DEFAULT_RATE_LIMIT: u32 = 1000;
/// Default burst size per queue.
pub const DEFAULT_BURST: u32 = 100;

/// Kind of task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskQueueKind {
    /// A regular shared queue.
    #[default]
    Normal,
    /// A worker-affine queue.
    Sticky,
}

/// Per-queue counters.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    tasks_added: AtomicU64,
    tasks_dispatched: AtomicU64,
    pollers_waiting: AtomicI64,
    dispatch_latency_ms_total: AtomicU64,
}

impl QueueMetrics {
    /// Tasks accepted by `add_task` (duplicates excluded).
    pub fn tasks_added(&self) -> u64 {
        self.tasks_added.load(Ordering::Relaxed)
    }

    /// Tasks handed to pollers.
    pub fn tasks_dispatched(&self) -> u64 {
        self.tasks_dispatched.load(Ordering::Relaxed)
    }

    /// Pollers currently parked.
    pub fn pollers_waiting(&self) -> i64 {
        self.pollers_waiting.load(Ordering::Relaxed)
    }

    /// Sum of schedule-to-dispatch latency in milliseconds.
    pub fn dispatch_latency_ms_total(&self) -> u64 {
        self.dispatch_latency_ms_total.load(Ordering::Relaxed)
    }

    fn record_dispatch(&self, task: &Task) {
        self.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
        let latency_ms = (Utc::now() - task.scheduled_time).num_milliseconds().max(0) as u64;
        self.dispatch_latency_ms_total
            .fetch_add(latency_ms, Ordering::Relaxed);
    }
}

struct ParkedPoller {
    id: u64,
    tx: oneshot::Sender<Task>,
}

#[derive(Default)]
struct QueueInner {
    tasks: VecDeque<Task>,
    task_index: HashSet<String>,
    pollers: VecDeque<ParkedPoller>,
    next_poller_id: u64,
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// A named FIFO of tasks with parked long-pollers.
pub struct TaskQueue {
    name: String,
    kind: TaskQueueKind,
    inner: Arc<Mutex<QueueInner>>,
    rate_limiter: DirectRateLimiter,
    metrics: QueueMetrics,
}

impl TaskQueue {
    /// Create a queue with the given rate limit and burst (defaulted when 0).
    pub fn new(name: &str, kind: TaskQueueKind, rate_limit: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::new(DEFAULT_RATE_LIMIT).unwrap());
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::new(DEFAULT_BURST).unwrap());
        Self {
            name: name.to_string(),
            kind,
            inner: Arc::new(Mutex::new(QueueInner::default())),
            rate_limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
            metrics: QueueMetrics::default(),
        }
    }

    /// The queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue kind.
    pub fn kind(&self) -> TaskQueueKind {
        self.kind
    }

    /// Per-queue counters.
    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }

    /// Enqueue a task. A duplicate id among pending tasks is rejected
    /// silently (`false`). A parked poller receives the task directly.
    pub fn add_task(&self, mut task: Task) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.task_index.contains(&task.id) {
            return false;
        }

        self.metrics.tasks_added.fetch_add(1, Ordering::Relaxed);

        // Direct hand-off to the oldest parked poller. A poller whose
        // receiver was dropped mid-flight hands the task to the next one.
        while let Some(poller) = inner.pollers.pop_front() {
            task.started_time = Some(Utc::now());
            match poller.tx.send(task) {
                Ok(()) => return true,
                Err(returned) => {
                    task = returned;
                    task.started_time = None;
                }
            }
        }

        inner.task_index.insert(task.id.clone());
        inner.tasks.push_back(task);
        true
    }

    /// Pop a task, or park until one is handed over.
    ///
    /// Consumes one rate-limiter token up front; when tokens are exhausted
    /// the poll fails with [`MatchingError::RateLimited`]. Cancellation is
    /// dropping the returned future.
    pub async fn poll(&self, _identity: &str) -> Result<Task, MatchingError> {
        if self.rate_limiter.check().is_err() {
            return Err(MatchingError::RateLimited);
        }

        let (poller_id, rx) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

            if let Some(mut task) = inner.tasks.pop_front() {
                inner.task_index.remove(&task.id);
                task.started_time = Some(Utc::now());
                self.metrics.record_dispatch(&task);
                return Ok(task);
            }

            let id = inner.next_poller_id;
            inner.next_poller_id += 1;
            let (tx, rx) = oneshot::channel();
            inner.pollers.push_back(ParkedPoller { id, tx });
            self.metrics.pollers_waiting.fetch_add(1, Ordering::Relaxed);
            (id, rx)
        };

        let _guard = UnparkGuard {
            id: poller_id,
            inner: Arc::clone(&self.inner),
            metrics: &self.metrics,
        };

        match rx.await {
            Ok(task) => {
                self.metrics.record_dispatch(&task);
                Ok(task)
            }
            Err(_) => Err(MatchingError::Canceled),
        }
    }

    /// Remove a pending task by id. Returns whether it was present.
    pub fn complete_task(&self, task_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.task_index.remove(task_id) {
            return false;
        }
        if let Some(pos) = inner.tasks.iter().position(|t| t.id == task_id) {
            inner.tasks.remove(pos);
        }
        true
    }

    /// Number of pending (not yet dispatched) tasks.
    pub fn pending_task_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tasks.len()
    }

    /// Number of parked pollers.
    pub fn poller_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.pollers.len()
    }
}

/// Removes an abandoned parked poller under the queue lock.
struct UnparkGuard<'a> {
    id: u64,
    inner: Arc<Mutex<QueueInner>>,
    metrics: &'a QueueMetrics,
}

impl Drop for UnparkGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = inner.pollers.iter().position(|p| p.id == self.id) {
            inner.pollers.remove(pos);
        }
        self.metrics.pollers_waiting.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use linkflow_api::execution::ExecutionKey;
    use linkflow_api::task::TaskKind;

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            token: Vec::new(),
            key: ExecutionKey::new("default", "w1", "r1"),
            kind: TaskKind::ActivityTask,
            node_id: "n1".to_string(),
            node_type: "http".to_string(),
            input: Vec::new(),
            config: Vec::new(),
            scheduled_event_id: 2,
            scheduled_time: Utc::now(),
            started_time: None,
            attempt: 1,
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_fifo_order_single_producer() {
        let queue = TaskQueue::new("q", TaskQueueKind::Normal, 0, 0);
        for i in 0..5 {
            assert!(queue.add_task(task(&format!("t{i}"))));
        }
        for i in 0..5 {
            let polled = queue.poll("w").await.unwrap();
            assert_eq!(polled.id, format!("t{i}"));
            assert!(polled.started_time.is_some());
        }
    }

    #[tokio::test]
    async fn test_duplicate_add_rejected_silently() {
        let queue = TaskQueue::new("q", TaskQueueKind::Normal, 0, 0);
        assert!(queue.add_task(task("x")));
        assert!(!queue.add_task(task("x")));
        assert_eq!(queue.pending_task_count(), 1);

        // One poll drains it, the second parks.
        let polled = queue.poll("w").await.unwrap();
        assert_eq!(polled.id, "x");
        assert_eq!(queue.pending_task_count(), 0);

        let queue = Arc::new(queue);
        let blocked = tokio::spawn({
            let queue = queue.clone();
            async move { queue.poll("w").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.pending_task_count(), 0);
        assert_eq!(queue.poller_count(), 1);
        blocked.abort();
    }

    #[tokio::test]
    async fn test_parked_poller_receives_direct_handoff() {
        let queue = Arc::new(TaskQueue::new("q", TaskQueueKind::Normal, 0, 0));

        let poll = tokio::spawn({
            let queue = queue.clone();
            async move { queue.poll("w").await }
        });
        // Wait until the poller is parked.
        for _ in 0..100 {
            if queue.poller_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(queue.poller_count(), 1);

        assert!(queue.add_task(task("direct")));
        let polled = poll.await.unwrap().unwrap();
        assert_eq!(polled.id, "direct");
        // Hand-off bypassed the pending queue entirely.
        assert_eq!(queue.pending_task_count(), 0);
        assert_eq!(queue.poller_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_unparks() {
        let queue = Arc::new(TaskQueue::new("q", TaskQueueKind::Normal, 0, 0));
        let poll = tokio::spawn({
            let queue = queue.clone();
            async move { queue.poll("w").await }
        });
        for _ in 0..100 {
            if queue.poller_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        poll.abort();
        let _ = poll.await;
        assert_eq!(queue.poller_count(), 0);
        assert_eq!(queue.metrics().pollers_waiting(), 0);

        // The queue still works afterwards.
        assert!(queue.add_task(task("later")));
        assert_eq!(queue.poll("w").await.unwrap().id, "later");
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion() {
        // burst 2 at 1 qps: the third immediate poll must be limited.
        let queue = TaskQueue::new("q", TaskQueueKind::Normal, 1, 2);
        queue.add_task(task("a"));
        queue.add_task(task("b"));
        queue.add_task(task("c"));

        assert!(queue.poll("w").await.is_ok());
        assert!(queue.poll("w").await.is_ok());
        assert_eq!(queue.poll("w").await.unwrap_err(), MatchingError::RateLimited);
    }

    #[tokio::test]
    async fn test_complete_task_idempotent() {
        let queue = TaskQueue::new("q", TaskQueueKind::Normal, 0, 0);
        queue.add_task(task("x"));
        assert!(queue.complete_task("x"));
        assert!(!queue.complete_task("x"));
        assert_eq!(queue.pending_task_count(), 0);

        // A completed (removed) id may be re-added.
        assert!(queue.add_task(task("x")));
    }

    #[tokio::test]
    async fn test_no_duplicate_delivery() {
        let queue = Arc::new(TaskQueue::new("q", TaskQueueKind::Normal, 0, 0));
        for i in 0..20 {
            queue.add_task(task(&format!("t{i}")));
            queue.add_task(task(&format!("t{i}")));
        }

        let mut seen = std::collections::HashSet::new();
        while queue.pending_task_count() > 0 {
            let polled = queue.poll("w").await.unwrap();
            assert!(seen.insert(polled.id.clone()), "duplicate delivery of {}", polled.id);
        }
        assert_eq!(seen.len(), 20);
    }
}
