// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LinkFlow Matching - the task-queue layer.
//!
//! Matching hands tasks from history to workers through named FIFO queues
//! with long-polling consumers:
//!
//! - [`queue`]: per-queue FIFO with dedup, a token-bucket rate limiter, and
//!   parked pollers
//! - [`partition`]: consistent-hash partitioning of queue names
//! - [`service`]: the add/poll/complete surface
//! - [`handlers`]: QUIC request routing
//!
//! Delivery is at-least-once; deterministic task ids plus queue dedup keep
//! duplicates from reaching pollers twice concurrently.

pub mod error;
pub mod handlers;
pub mod partition;
pub mod queue;
pub mod service;

pub use error::MatchingError;
pub use queue::{TaskQueue, TaskQueueKind};
pub use service::{MatchingConfig, MatchingService};
