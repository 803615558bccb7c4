// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LinkFlow Worker - the task execution runtime.
//!
//! Workers long-poll matching for tasks and advance executions:
//!
//! - **Workflow tasks** run the [`driver`]: replay history, derive node
//!   states, emit the next commands.
//! - **Activity tasks** resolve a typed [`executor`] and run it with a
//!   per-task timeout; results are reported back into history.
//!
//! # Modules
//!
//! - [`poller`]: long-poll loop with backoff
//! - [`retry`]: exponential backoff with jitter and retry classification
//! - [`executor`]: executor trait, registry, and the built-in catalog
//! - [`driver`]: the replay-driven workflow driver
//! - [`callback`]: signed completion callbacks
//! - [`service`]: poller fan-out, task dispatch, graceful shutdown

pub mod callback;
pub mod driver;
pub mod executor;
pub mod poller;
pub mod retry;
pub mod service;

pub use driver::WorkflowDriver;
pub use executor::{ExecuteRequest, ExecuteResponse, Executor, Registry};
pub use retry::Policy;
pub use service::{WorkerConfig, WorkerService};
