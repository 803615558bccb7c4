// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LinkFlow Engine binary: every service in one process.
//!
//! For distributed deployments run `linkflow-history`,
//! `linkflow-matching`, and `linkflow-worker` instead.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use linkflow_engine::EngineRuntime;

#[derive(Debug, Parser)]
#[command(name = "linkflow-engine", about = "LinkFlow single-process engine")]
struct Args {
    /// HTTP health port.
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Number of history shards.
    #[arg(long, default_value_t = 16)]
    shard_count: u32,

    /// Number of matching partitions.
    #[arg(long, default_value_t = 4)]
    partition_count: u32,

    /// Comma-separated task queues to poll.
    #[arg(long, env = "TASK_QUEUE", default_value = "workflows-default")]
    task_queue: String,

    /// Pollers per task queue.
    #[arg(long, default_value_t = 4)]
    num_workers: usize,

    /// Minimum poll interval in seconds.
    #[arg(long, default_value_t = 1)]
    poll_interval: u64,

    /// Secret for signing completion callbacks.
    #[arg(long, env = "CALLBACK_SECRET")]
    callback_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linkflow_engine=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!(
        shard_count = args.shard_count,
        partition_count = args.partition_count,
        task_queue = %args.task_queue,
        num_workers = args.num_workers,
        "starting LinkFlow engine"
    );

    let mut builder = EngineRuntime::builder()
        .shard_count(args.shard_count)
        .partition_count(args.partition_count)
        .task_queues(args.task_queue.split(',').map(str::to_string).collect())
        .num_pollers(args.num_workers)
        .poll_interval(Duration::from_secs(args.poll_interval));
    if let Some(secret) = args.callback_secret {
        builder = builder.callback_secret(secret);
    }
    let runtime = builder.build()?.start().await?;

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

    info!("engine ready");

    shutdown_signal().await?;
    info!("received shutdown signal");

    runtime.shutdown().await?;
    http_handle.abort();

    info!("engine stopped");
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
