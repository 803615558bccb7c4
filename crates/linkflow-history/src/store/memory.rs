// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory store implementations with optimistic-version CAS.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use linkflow_api::events::HistoryEvent;
use linkflow_api::execution::{ExecutionKey, MutableState};

use super::{EventStore, MutableStateStore, StoreError};

fn make_key(key: &ExecutionKey) -> String {
    format!("{}/{}/{}", key.namespace_id, key.workflow_id, key.run_id)
}

/// In-memory append-only event log.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    inner: RwLock<EventStoreInner>,
}

#[derive(Debug, Default)]
struct EventStoreInner {
    events: HashMap<String, Vec<HistoryEvent>>,
    versions: HashMap<String, i64>,
}

impl MemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored version for a key (0 for unknown keys).
    pub fn version(&self, key: &ExecutionKey) -> i64 {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.versions.get(&make_key(key)).copied().unwrap_or(0)
    }

    /// Drop everything. Test helper.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.events.clear();
        inner.versions.clear();
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append_events(
        &self,
        key: &ExecutionKey,
        events: &[HistoryEvent],
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let k = make_key(key);
        let current_version = inner.versions.get(&k).copied().unwrap_or(0);

        if expected_version >= 0 && current_version != expected_version {
            return Err(StoreError::VersionMismatch);
        }

        inner
            .events
            .entry(k.clone())
            .or_default()
            .extend_from_slice(events);
        inner.versions.insert(k, current_version + events.len() as i64);

        Ok(())
    }

    async fn get_events(
        &self,
        key: &ExecutionKey,
        first_event_id: i64,
        last_event_id: i64,
    ) -> Result<Vec<HistoryEvent>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let all_events = inner
            .events
            .get(&make_key(key))
            .ok_or(StoreError::ExecutionNotFound)?;

        Ok(all_events
            .iter()
            .filter(|e| e.event_id >= first_event_id && e.event_id <= last_event_id)
            .cloned()
            .collect())
    }
}

/// In-memory mutable-state snapshots.
#[derive(Debug, Default)]
pub struct MemoryMutableStateStore {
    states: RwLock<HashMap<String, MutableState>>,
}

impl MemoryMutableStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything. Test helper.
    pub fn clear(&self) {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        states.clear();
    }
}

#[async_trait]
impl MutableStateStore for MemoryMutableStateStore {
    async fn get_mutable_state(&self, key: &ExecutionKey) -> Result<MutableState, StoreError> {
        let states = self.states.read().unwrap_or_else(|e| e.into_inner());
        states
            .get(&make_key(key))
            .map(MutableState::deep_clone)
            .ok_or(StoreError::ExecutionNotFound)
    }

    async fn update_mutable_state(
        &self,
        key: &ExecutionKey,
        state: &MutableState,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        let k = make_key(key);

        if expected_version >= 0 {
            match states.get(&k) {
                None if expected_version != 0 => return Err(StoreError::VersionMismatch),
                Some(existing) if existing.db_version != expected_version => {
                    return Err(StoreError::VersionMismatch)
                }
                _ => {}
            }
        }

        let mut clone = state.deep_clone();
        clone.db_version = state.db_version + 1;
        states.insert(k, clone);

        Ok(())
    }

    async fn delete_mutable_state(&self, key: &ExecutionKey) -> Result<(), StoreError> {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        states.remove(&make_key(key));
        Ok(())
    }
}
