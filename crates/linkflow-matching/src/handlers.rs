// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC request routing for the matching service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, instrument};

use linkflow_protocol::frame::Frame;
use linkflow_protocol::messages::{MatchingRequest, MatchingResponse, RpcError};
use linkflow_protocol::server::{ConnectionHandler, StreamHandler};

use crate::error::MatchingError;
use crate::service::MatchingService;

/// Upper bound on the server-side poll block, whatever the client asks for.
const MAX_POLL_BLOCK: Duration = Duration::from_secs(30);

/// Shared state for matching handlers.
pub struct HandlerState {
    /// The matching service.
    pub service: Arc<MatchingService>,
}

impl HandlerState {
    /// Create handler state over a service.
    pub fn new(service: Arc<MatchingService>) -> Self {
        Self { service }
    }
}

fn error_response(err: &MatchingError) -> MatchingResponse {
    MatchingResponse::Error(RpcError {
        code: err.error_code().to_string(),
        message: err.to_string(),
    })
}

/// Handle a single connection.
#[instrument(skip(conn, state), fields(remote = %conn.remote_address()))]
pub async fn handle_connection(conn: ConnectionHandler, state: Arc<HandlerState>) {
    info!("matching connection accepted");

    conn.run(move |stream: StreamHandler| {
        let state = state.clone();
        async move {
            if let Err(e) = handle_stream(stream, state).await {
                error!("stream error: {}", e);
            }
        }
    })
    .await;

    debug!("matching connection closed");
}

/// Handle a single stream (one request/response).
pub async fn handle_stream(mut stream: StreamHandler, state: Arc<HandlerState>) -> Result<()> {
    let request_frame = stream.read_frame().await?;
    let request: MatchingRequest = request_frame.decode()?;

    let response = dispatch(&state, request).await;

    stream.write_frame(&Frame::response(&response)?).await?;
    stream.finish()?;
    Ok(())
}

async fn dispatch(state: &HandlerState, request: MatchingRequest) -> MatchingResponse {
    let service = &state.service;
    match request {
        MatchingRequest::AddTask { task_queue, task } => {
            match service.add_task(&task_queue, task).await {
                Ok(()) => MatchingResponse::TaskAdded,
                Err(err) => error_response(&err),
            }
        }
        MatchingRequest::PollTask {
            task_queue,
            identity,
            block_ms,
        } => {
            let block = Duration::from_millis(block_ms).min(MAX_POLL_BLOCK);
            match tokio::time::timeout(block, service.poll_task(&task_queue, &identity)).await {
                Ok(Ok(task)) => MatchingResponse::Polled { task: Some(task) },
                // The block elapsed with nothing to hand out.
                Err(_) => MatchingResponse::Polled { task: None },
                Ok(Err(err)) => error_response(&err),
            }
        }
        MatchingRequest::CompleteTask {
            task_queue,
            task_id,
        } => match service.complete_task(&task_queue, &task_id).await {
            Ok(()) => MatchingResponse::Completed { found: true },
            Err(MatchingError::TaskNotFound(_)) => MatchingResponse::Completed { found: false },
            Err(err) => error_response(&err),
        },
    }
}
