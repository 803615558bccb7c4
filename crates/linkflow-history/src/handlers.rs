// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC request routing for the history service.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, instrument};

use linkflow_protocol::frame::Frame;
use linkflow_protocol::messages::{HistoryRequest, HistoryResponse, RpcError};
use linkflow_protocol::server::{ConnectionHandler, StreamHandler};

use crate::error::HistoryError;
use crate::service::Service;

/// Shared state for history handlers.
pub struct HandlerState {
    /// The history service.
    pub service: Arc<Service>,
}

impl HandlerState {
    /// Create handler state over a service.
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

fn error_response(err: &HistoryError) -> HistoryResponse {
    HistoryResponse::Error(RpcError {
        code: err.error_code().to_string(),
        message: err.to_string(),
    })
}

/// Handle a single connection.
#[instrument(skip(conn, state), fields(remote = %conn.remote_address()))]
pub async fn handle_connection(conn: ConnectionHandler, state: Arc<HandlerState>) {
    info!("history connection accepted");

    conn.run(move |stream: StreamHandler| {
        let state = state.clone();
        async move {
            if let Err(e) = handle_stream(stream, state).await {
                error!("stream error: {}", e);
            }
        }
    })
    .await;

    debug!("history connection closed");
}

/// Handle a single stream (one request/response).
pub async fn handle_stream(mut stream: StreamHandler, state: Arc<HandlerState>) -> Result<()> {
    let request_frame = stream.read_frame().await?;
    let request: HistoryRequest = request_frame.decode()?;

    debug!(request = ?std::mem::discriminant(&request), "history request");

    let response = dispatch(&state, request).await;

    stream.write_frame(&Frame::response(&response)?).await?;
    stream.finish()?;
    Ok(())
}

async fn dispatch(state: &HandlerState, request: HistoryRequest) -> HistoryResponse {
    let service = &state.service;
    match request {
        HistoryRequest::RecordEvent { key, event } => {
            match service.record_event(&key, event).await {
                Ok(event_id) => HistoryResponse::EventRecorded { event_id },
                Err(err) => error_response(&err),
            }
        }
        HistoryRequest::GetHistory {
            key,
            first_event_id,
            last_event_id,
        } => match service.get_history(&key, first_event_id, last_event_id).await {
            Ok(events) => HistoryResponse::History { events },
            Err(err) => error_response(&err),
        },
        HistoryRequest::GetMutableState { key } => match service.get_mutable_state(&key).await {
            Ok(mutable_state) => HistoryResponse::State {
                state: mutable_state,
            },
            Err(err) => error_response(&err),
        },
        HistoryRequest::RespondWorkflowTaskCompleted {
            key,
            task_token,
            commands,
        } => match service
            .respond_workflow_task_completed(&key, &task_token, commands)
            .await
        {
            Ok(()) => HistoryResponse::Ack,
            Err(err) => error_response(&err),
        },
        HistoryRequest::RespondWorkflowTaskFailed {
            key,
            task_token,
            failure,
        } => match service
            .respond_workflow_task_failed(&key, &task_token, failure)
            .await
        {
            Ok(()) => HistoryResponse::Ack,
            Err(err) => error_response(&err),
        },
        HistoryRequest::RespondActivityTaskCompleted {
            key,
            scheduled_event_id,
            result,
        } => match service
            .respond_activity_task_completed(&key, scheduled_event_id, result)
            .await
        {
            Ok(()) => HistoryResponse::Ack,
            Err(err) => error_response(&err),
        },
        HistoryRequest::RespondActivityTaskFailed {
            key,
            scheduled_event_id,
            failure,
        } => match service
            .respond_activity_task_failed(&key, scheduled_event_id, failure)
            .await
        {
            Ok(()) => HistoryResponse::Ack,
            Err(err) => error_response(&err),
        },
    }
}
