// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LinkFlow Protocol - QUIC + JSON communication layer.
//!
//! This crate provides the wire protocol between LinkFlow services:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    linkflow-protocol                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RPC Layer: one request/response per QUIC stream            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: JSON (serde)                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: QUIC (quinn)                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocols
//!
//! - [`messages::HistoryRequest`]/[`messages::HistoryResponse`]: record and
//!   read history, task-completion reporting
//! - [`messages::MatchingRequest`]/[`messages::MatchingResponse`]: add,
//!   long-poll, and complete tasks
//!
//! [`remote::RemoteHistoryClient`] and [`remote::RemoteMatchingClient`]
//! implement the `linkflow-api` client traits on top of [`FlowClient`].

pub mod client;
pub mod frame;
pub mod messages;
pub mod remote;
pub mod server;

pub use client::{ClientError, FlowClient, FlowClientConfig};
pub use frame::{Frame, FrameError, MessageType};
pub use remote::{RemoteHistoryClient, RemoteMatchingClient};
pub use server::{ConnectionHandler, FlowServer, FlowServerConfig, ServerError, StreamHandler};
