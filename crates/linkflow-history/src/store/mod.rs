// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces for history events and mutable state.
//!
//! Both stores use optimistic concurrency: a negative `expected_version`
//! skips the check, anything else must match the stored version exactly.
//! The in-memory implementations live in [`memory`]; a durable backend
//! plugs in behind the same traits.

pub mod memory;

pub use self::memory::{MemoryEventStore, MemoryMutableStateStore};

use async_trait::async_trait;

use linkflow_api::events::HistoryEvent;
use linkflow_api::execution::{ExecutionKey, MutableState};

/// Store-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The expected version does not match the stored version.
    #[error("version mismatch")]
    VersionMismatch,

    /// No data for this execution key.
    #[error("execution not found")]
    ExecutionNotFound,

    /// No such event.
    #[error("event not found")]
    EventNotFound,
}

/// Append-only log of history events, per execution key.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append `events` atomically. With `expected_version >= 0` the append
    /// fails with [`StoreError::VersionMismatch`] unless the stored version
    /// matches; on success the version advances by `events.len()`.
    async fn append_events(
        &self,
        key: &ExecutionKey,
        events: &[HistoryEvent],
        expected_version: i64,
    ) -> Result<(), StoreError>;

    /// Events with `first_event_id <= event_id <= last_event_id`, in order.
    async fn get_events(
        &self,
        key: &ExecutionKey,
        first_event_id: i64,
        last_event_id: i64,
    ) -> Result<Vec<HistoryEvent>, StoreError>;
}

/// Snapshot store for mutable state, per execution key.
#[async_trait]
pub trait MutableStateStore: Send + Sync {
    /// Deep clone of the stored state. Callers can never alias-mutate the
    /// stored copy.
    async fn get_mutable_state(&self, key: &ExecutionKey) -> Result<MutableState, StoreError>;

    /// CAS write. On success the stored state's `db_version` is set to
    /// `state.db_version + 1`.
    async fn update_mutable_state(
        &self,
        key: &ExecutionKey,
        state: &MutableState,
        expected_version: i64,
    ) -> Result<(), StoreError>;

    /// Remove the state for a key; unknown keys are a no-op.
    async fn delete_mutable_state(&self, key: &ExecutionKey) -> Result<(), StoreError>;
}
