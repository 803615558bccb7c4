// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LinkFlow Worker service binary.
//!
//! Polls matching for tasks, runs the replay driver and the built-in
//! executor catalog, and reports results back to history.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use linkflow_protocol::{FlowClient, RemoteHistoryClient, RemoteMatchingClient};
use linkflow_worker::executor;
use linkflow_worker::service::{WorkerConfig, WorkerService};

#[derive(Debug, Parser)]
#[command(name = "linkflow-worker", about = "LinkFlow Worker service")]
struct Args {
    /// HTTP health port.
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Comma-separated task queues to poll.
    #[arg(long, env = "TASK_QUEUE", default_value = "default")]
    task_queue: String,

    /// Matching service address.
    #[arg(long, env = "MATCHING_ADDR", default_value = "127.0.0.1:7235")]
    matching_addr: SocketAddr,

    /// History service address.
    #[arg(long, env = "HISTORY_ADDR", default_value = "127.0.0.1:7234")]
    history_addr: SocketAddr,

    /// Pollers per task queue.
    #[arg(long, default_value_t = 4)]
    num_workers: usize,

    /// Minimum poll interval, e.g. "1s" or "500ms".
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    poll_interval: Duration,

    /// Secret for signing completion callbacks.
    #[arg(long, env = "CALLBACK_SECRET")]
    callback_secret: Option<String>,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    if let Some(ms) = value.strip_suffix("ms") {
        let ms: u64 = ms.parse().map_err(|_| format!("invalid duration: {value}"))?;
        return Ok(Duration::from_millis(ms));
    }
    if let Some(secs) = value.strip_suffix('s') {
        let secs: u64 = secs
            .parse()
            .map_err(|_| format!("invalid duration: {value}"))?;
        return Ok(Duration::from_secs(secs));
    }
    let secs: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration: {value}"))?;
    Ok(Duration::from_secs(secs))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linkflow_worker=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!(
        task_queue = %args.task_queue,
        matching_addr = %args.matching_addr,
        history_addr = %args.history_addr,
        num_workers = args.num_workers,
        "starting LinkFlow Worker service"
    );

    let history_client = FlowClient::localhost(args.history_addr)
        .context("failed to create history client")?;
    let matching_client = FlowClient::localhost(args.matching_addr)
        .context("failed to create matching client")?;

    let service = Arc::new(WorkerService::new(
        Arc::new(RemoteHistoryClient::new(history_client)),
        Arc::new(RemoteMatchingClient::new(matching_client)),
        executor::builtin_registry(),
        WorkerConfig {
            task_queues: args.task_queue.split(',').map(str::to_string).collect(),
            num_pollers: args.num_workers,
            identity: format!("worker-{}", std::process::id()),
            poll_interval: args.poll_interval,
            callback_secret: args.callback_secret,
            ..Default::default()
        },
    ));

    service.start().context("failed to start worker service")?;

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

    info!("worker service ready");

    shutdown_signal().await?;
    info!("received shutdown signal");

    if let Err(err) = service.stop().await {
        error!(error = %err, "failed to stop worker service");
    }
    http_handle.abort();

    info!("worker service stopped");
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
