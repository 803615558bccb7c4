// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LinkFlow History service binary.
//!
//! Serves the history RPC protocol over QUIC and a `/health` endpoint over
//! HTTP. Task dispatch goes to the matching service when `--matching-addr`
//! is configured.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use linkflow_history::handlers::{self, HandlerState};
use linkflow_history::service::{Service, ServiceConfig};
use linkflow_history::shard::ShardController;
use linkflow_history::store::{MemoryEventStore, MemoryMutableStateStore};
use linkflow_protocol::{FlowClient, FlowServer, RemoteMatchingClient};

#[derive(Debug, Parser)]
#[command(name = "linkflow-history", about = "LinkFlow History service")]
struct Args {
    /// QUIC RPC port.
    #[arg(long, default_value_t = 7234)]
    port: u16,

    /// HTTP health port.
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Number of shards.
    #[arg(long, default_value_t = 16)]
    shard_count: u32,

    /// Matching service address for task dispatch.
    #[arg(long, env = "MATCHING_ADDR")]
    matching_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linkflow_history=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!(
        port = args.port,
        http_port = args.http_port,
        shard_count = args.shard_count,
        "starting LinkFlow History service"
    );

    let matching: Option<Arc<dyn linkflow_api::client::MatchingClient>> = match args.matching_addr
    {
        Some(addr) => {
            let client = FlowClient::localhost(addr).context("failed to create matching client")?;
            Some(Arc::new(RemoteMatchingClient::new(client)))
        }
        None => {
            warn!("no matching address configured, task dispatch is disabled");
            None
        }
    };

    let service = Arc::new(Service::new(ServiceConfig {
        shard_controller: Arc::new(ShardController::new(args.shard_count)),
        event_store: Arc::new(MemoryEventStore::new()),
        state_store: Arc::new(MemoryMutableStateStore::new()),
        matching,
        metrics: None,
    }));
    service.start()?;

    let bind_addr: SocketAddr = ([0, 0, 0, 0], args.port).into();
    let server = FlowServer::localhost(bind_addr).context("failed to bind QUIC server")?;

    let state = Arc::new(HandlerState::new(service.clone()));
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

    info!("history service ready");

    shutdown_signal().await?;
    info!("received shutdown signal");

    service.stop();
    server_handle.abort();
    http_handle.abort();

    info!("history service stopped");
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
