// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LinkFlow Engine - embedded single-process runtime.
//!
//! Wires history, matching, worker, and frontend together in one process
//! with in-process client adapters instead of the QUIC transport. This is
//! the substrate for local deployments and end-to-end tests.
//!
//! ```rust,ignore
//! use linkflow_engine::EngineRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = EngineRuntime::builder()
//!         .task_queues(vec!["workflows-default".to_string()])
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... submit work through runtime.frontend() ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod clients;
pub mod runtime;

pub use clients::{EmbeddedHistoryClient, EmbeddedMatchingClient};
pub use runtime::{EngineRuntime, EngineRuntimeBuilder};
