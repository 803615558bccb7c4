// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LinkFlow Matching service binary.
//!
//! Serves the matching RPC protocol over QUIC and a `/health` endpoint
//! over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use linkflow_matching::handlers::{self, HandlerState};
use linkflow_matching::service::{MatchingConfig, MatchingService};
use linkflow_protocol::FlowServer;

#[derive(Debug, Parser)]
#[command(name = "linkflow-matching", about = "LinkFlow Matching service")]
struct Args {
    /// QUIC RPC port.
    #[arg(long, default_value_t = 7235)]
    port: u16,

    /// HTTP health port.
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Number of partitions.
    #[arg(long, default_value_t = 4)]
    partition_count: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linkflow_matching=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!(
        port = args.port,
        http_port = args.http_port,
        partition_count = args.partition_count,
        "starting LinkFlow Matching service"
    );

    let service = Arc::new(MatchingService::new(MatchingConfig {
        num_partitions: args.partition_count,
        ..Default::default()
    }));

    let bind_addr: SocketAddr = ([0, 0, 0, 0], args.port).into();
    let server = FlowServer::localhost(bind_addr).context("failed to bind QUIC server")?;

    let state = Arc::new(HandlerState::new(service));
    let server_handle = tokio::spawn(async move {
        let state = state.clone();
        if let Err(e) = server
            .run(move |conn| {
                let state = state.clone();
                async move {
                    handlers::handle_connection(conn, state).await;
                }
            })
            .await
        {
            error!("QUIC server error: {}", e);
        }
    });

    let http_addr: SocketAddr = ([0, 0, 0, 0], args.http_port).into();
    let http_listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .context("failed to bind HTTP server")?;
    let health = axum::Router::new().route("/health", axum::routing::get(|| async { "OK" }));
    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, health).await {
            error!("http server error: {}", e);
        }
    });

    info!("matching service ready");

    shutdown_signal().await?;
    info!("received shutdown signal");

    server_handle.abort();
    http_handle.abort();

    info!("matching service stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
