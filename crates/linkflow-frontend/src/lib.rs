// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LinkFlow Frontend - workflow intake.
//!
//! The frontend turns intake job payloads into running executions:
//! [`service::FrontendService`] records `EXECUTION_STARTED` through a
//! history client, and [`consumer::IntakeConsumer`] drains a job stream
//! with bounded retry and dead-lettering.
//!
//! The HTTP ingress façade and the Redis stream implementation live
//! outside this crate; the consumer only sees the [`consumer::IntakeSource`]
//! and [`consumer::DlqSink`] traits.

pub mod consumer;
pub mod service;

pub use consumer::{ConsumerConfig, DlqEntry, DlqSink, IntakeConsumer, IntakeSource};
pub use service::{FrontendService, StartWorkflowExecutionRequest};
