// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shard controller: stable mapping of execution keys onto shards.
//!
//! The shard id is `fnv1a_32(namespace_id ‖ workflow_id) % shard_count`.
//! The run id is intentionally excluded so all runs of one workflow share
//! a shard (history locality).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use linkflow_api::execution::ExecutionKey;

/// Default number of shards.
pub const DEFAULT_SHARD_COUNT: u32 = 16;

const FNV_OFFSET_BASIS_32: u32 = 0x811c9dc5;
const FNV_PRIME_32: u32 = 0x0100_0193;

/// FNV-1a, 32-bit, over the concatenated inputs.
fn fnv1a_32(parts: &[&[u8]]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS_32;
    for part in parts {
        for &byte in *part {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME_32);
        }
    }
    hash
}

/// Ownership status of one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardStatus {
    /// This process owns the shard.
    Owned,
    /// The shard is being handed off.
    Transferring,
    /// The shard has been released.
    Stopped,
}

/// A handle to one shard of the execution keyspace.
#[derive(Debug)]
pub struct Shard {
    shard_id: u32,
    status: RwLock<ShardStatus>,
}

impl Shard {
    fn new(shard_id: u32) -> Self {
        Self {
            shard_id,
            status: RwLock::new(ShardStatus::Owned),
        }
    }

    /// The shard's id.
    pub fn id(&self) -> u32 {
        self.shard_id
    }

    /// Current ownership status.
    pub fn status(&self) -> ShardStatus {
        *self.status.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: ShardStatus) {
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }
}

/// Maps execution keys to shards and owns shard lifecycle.
///
/// In single-process mode every shard is `Owned`; the controller still
/// exists so the record pipeline and logs carry shard ids.
pub struct ShardController {
    shard_count: u32,
    shards: Mutex<HashMap<u32, Arc<Shard>>>,
}

impl ShardController {
    /// Create a controller for `shard_count` shards (defaulted when 0).
    pub fn new(shard_count: u32) -> Self {
        let shard_count = if shard_count == 0 {
            DEFAULT_SHARD_COUNT
        } else {
            shard_count
        };
        Self {
            shard_count,
            shards: Mutex::new(HashMap::new()),
        }
    }

    /// The configured shard count.
    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// The shard id for an execution key. Depends only on the namespace and
    /// workflow ids.
    pub fn shard_id_for_execution(&self, key: &ExecutionKey) -> u32 {
        fnv1a_32(&[key.namespace_id.as_bytes(), key.workflow_id.as_bytes()]) % self.shard_count
    }

    /// The shard handle for an execution key, lazily created.
    pub fn shard_for_execution(&self, key: &ExecutionKey) -> Arc<Shard> {
        let shard_id = self.shard_id_for_execution(key);
        self.acquire(shard_id)
    }

    /// Acquire a shard by id, creating it as `Owned` if unknown.
    pub fn acquire(&self, shard_id: u32) -> Arc<Shard> {
        let mut shards = self.shards.lock().unwrap_or_else(|e| e.into_inner());
        shards
            .entry(shard_id)
            .or_insert_with(|| Arc::new(Shard::new(shard_id)))
            .clone()
    }

    /// Release a shard: mark it `Stopped` and drop it from the registry.
    pub fn release(&self, shard_id: u32) {
        let mut shards = self.shards.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(shard) = shards.remove(&shard_id) {
            shard.set_status(ShardStatus::Stopped);
        }
    }

    /// Number of shards currently `Owned`.
    pub fn owned_shard_count(&self) -> usize {
        let shards = self.shards.lock().unwrap_or_else(|e| e.into_inner());
        shards
            .values()
            .filter(|s| s.status() == ShardStatus::Owned)
            .count()
    }

    /// Transition every shard to `Stopped` and drop the registry.
    pub fn stop(&self) {
        let mut shards = self.shards.lock().unwrap_or_else(|e| e.into_inner());
        for (_, shard) in shards.drain() {
            shard.set_status(ShardStatus::Stopped);
        }
    }
}
