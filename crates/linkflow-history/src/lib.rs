// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LinkFlow History - the event-sourced core of the engine.
//!
//! History owns the append-only event log and the mutable-state projection
//! for every execution. Writes flow through one pipeline:
//!
//! ```text
//! resolve shard → load state → validate + apply → append events (CAS)
//!     → update state (CAS) → dispatch tasks to matching (post-commit)
//! ```
//!
//! Optimistic concurrency on `db_version` serializes writers per execution
//! key: if two writers race, exactly one commits and the loser observes a
//! version mismatch. Task dispatch is a post-commit side effect; a dispatch
//! failure is logged and never unwinds the commit.
//!
//! # Modules
//!
//! - [`shard`]: stable hash of execution keys onto shards
//! - [`engine`]: event validation and apply rules
//! - [`events`]: the event builder
//! - [`store`]: event-log and mutable-state stores with optimistic CAS
//! - [`service`]: the record-event pipeline and task-completion surface
//! - [`handlers`]: QUIC request routing

pub mod engine;
pub mod error;
pub mod events;
pub mod handlers;
pub mod service;
pub mod shard;
pub mod store;

pub use error::HistoryError;
pub use service::{Service, ServiceConfig};
