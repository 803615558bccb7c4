// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Consistent-hash partitioning of the task-queue name space.
//!
//! Each queue name maps to one of `P` partitions through a hash ring with
//! virtual-node replication; each partition owns a lazy name → queue
//! registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::queue::{TaskQueue, TaskQueueKind};

/// Default number of partitions.
pub const DEFAULT_PARTITION_COUNT: u32 = 4;
/// Default virtual nodes per partition on the ring.
pub const DEFAULT_REPLICAS: usize = 100;

const FNV_OFFSET_BASIS_64: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME_64: u64 = 0x0000_0100_0000_01b3;

fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS_64;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME_64);
    }
    hash
}

/// Consistent-hash ring over partition ids.
#[derive(Debug)]
pub struct Ring {
    replicas: usize,
    ring: BTreeMap<u64, u32>,
}

impl Ring {
    /// Create an empty ring with `replicas` virtual nodes per member.
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            ring: BTreeMap::new(),
        }
    }

    /// Add a partition to the ring.
    pub fn add(&mut self, partition_id: u32) {
        for replica in 0..self.replicas {
            let point = fnv1a_64(format!("{partition_id}:{replica}").as_bytes());
            self.ring.insert(point, partition_id);
        }
    }

    /// The partition owning `name`: the first ring point at or after the
    /// name's hash, wrapping around.
    pub fn get(&self, name: &str) -> Option<u32> {
        if self.ring.is_empty() {
            return None;
        }
        let point = fnv1a_64(name.as_bytes());
        self.ring
            .range(point..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, &id)| id)
    }

    /// Number of points on the ring.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the ring has no members.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// One partition: a lazy registry of the queues it owns.
pub struct Partition {
    id: u32,
    task_queues: RwLock<HashMap<String, Arc<TaskQueue>>>,
}

impl Partition {
    fn new(id: u32) -> Self {
        Self {
            id,
            task_queues: RwLock::new(HashMap::new()),
        }
    }

    /// The partition id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Existing queue by name.
    pub fn task_queue(&self, name: &str) -> Option<Arc<TaskQueue>> {
        let queues = self.task_queues.read().unwrap_or_else(|e| e.into_inner());
        queues.get(name).cloned()
    }

    /// Queue by name, created lazily with the given rate/burst.
    pub fn get_or_create_task_queue(
        &self,
        name: &str,
        kind: TaskQueueKind,
        rate_limit: u32,
        burst: u32,
    ) -> Arc<TaskQueue> {
        {
            let queues = self.task_queues.read().unwrap_or_else(|e| e.into_inner());
            if let Some(queue) = queues.get(name) {
                return queue.clone();
            }
        }

        let mut queues = self.task_queues.write().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TaskQueue::new(name, kind, rate_limit, burst)))
            .clone()
    }

    /// Number of queues this partition owns.
    pub fn queue_count(&self) -> usize {
        let queues = self.task_queues.read().unwrap_or_else(|e| e.into_inner());
        queues.len()
    }
}

/// Owns all partitions and the ring that routes names onto them.
pub struct PartitionManager {
    partitions: HashMap<u32, Arc<Partition>>,
    ring: Ring,
    num_partitions: u32,
}

impl PartitionManager {
    /// Create `num_partitions` partitions (defaulted when 0) with
    /// `replicas` virtual nodes each.
    pub fn new(num_partitions: u32, replicas: usize) -> Self {
        let num_partitions = if num_partitions == 0 {
            DEFAULT_PARTITION_COUNT
        } else {
            num_partitions
        };
        let replicas = if replicas == 0 {
            DEFAULT_REPLICAS
        } else {
            replicas
        };

        let mut ring = Ring::new(replicas);
        let mut partitions = HashMap::new();
        for id in 0..num_partitions {
            partitions.insert(id, Arc::new(Partition::new(id)));
            ring.add(id);
        }

        Self {
            partitions,
            ring,
            num_partitions,
        }
    }

    /// The configured partition count.
    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    /// Partition by id.
    pub fn partition(&self, partition_id: u32) -> Option<Arc<Partition>> {
        self.partitions.get(&partition_id).cloned()
    }

    /// The partition owning a task-queue name.
    pub fn partition_for_task_queue(&self, name: &str) -> Arc<Partition> {
        // The ring always has at least one member.
        let id = self.ring.get(name).unwrap_or(0);
        self.partitions[&id].clone()
    }
}
