// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LinkFlow API - shared domain types for the workflow engine.
//!
//! This crate defines the vocabulary every LinkFlow service speaks:
//!
//! - [`execution`]: execution keys, execution info, and the mutable-state
//!   projection with its deep-clone discipline
//! - [`events`]: history event types and their typed attribute variants
//! - [`codec`]: deterministic JSON and binary encodings of history events
//! - [`task`]: tasks as they travel through matching to workers
//! - [`command`]: decision outputs the workflow driver emits
//! - [`workflow`]: the workflow definition DAG and intake job payloads
//! - [`client`]: wire-agnostic history/matching client traits
//!
//! Events are the sole source of truth; everything in [`execution`] is a
//! projection of them.

#![deny(missing_docs)]

/// Event serialization (structured JSON and compact binary).
pub mod codec;

/// History and matching client traits plus the shared client error set.
pub mod client;

/// Commands emitted by the workflow driver.
pub mod command;

/// Execution identity and mutable-state projection.
pub mod execution;

/// History events and typed attributes.
pub mod events;

/// Tasks and task tokens.
pub mod task;

/// Workflow definitions and intake payloads.
pub mod workflow;

pub use client::{ClientError, HistoryClient, MatchingClient};
pub use command::Command;
pub use events::{EventAttributes, EventType, HistoryEvent};
pub use execution::{ExecutionKey, ExecutionStatus, MutableState};
pub use task::{Task, TaskKind, TaskToken};
