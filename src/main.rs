// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use podmesh::config::{ConnectionList, PodAddresses, PollingMap, TopologyGraph};
use podmesh::executor::{build_executor, Parameters};
use podmesh::gateway::{self, GatewayConfig, GraphEngine, GrpcGateway};
use podmesh::head::{HeadConfig, HeadRuntime};
use podmesh::runtime;
use podmesh::worker::WorkerRuntime;

#[derive(Parser)]
#[command(name = "podmesh", about = "Request-routing data plane: gateway, head and worker runtimes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Terminate client transport and walk the topology graph
    Gateway(GatewayArgs),
    /// Front one pod's shards and replicas
    Head(HeadArgs),
    /// Host one executor instance
    Worker(WorkerArgs),
}

#[derive(Args)]
struct GatewayArgs {
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// JSON adjacency list, e.g. '{"start-gateway": ["pod0"], "pod0": ["end-gateway"]}'
    #[arg(long)]
    graph_description: String,
    /// JSON pod address table, e.g. '{"pod0": ["127.0.0.1:8081"]}'
    #[arg(long)]
    deployments_addresses: String,
    #[arg(long, value_enum, default_value = "grpc")]
    protocol: Protocol,
    #[arg(long, default_value_t = 3, allow_hyphen_values = true)]
    retries: i32,
    /// Max in-flight client requests; 0 disables back-pressure
    #[arg(long, default_value_t = 0)]
    prefetch: usize,
    /// Per-request deadline propagated downstream as RPC deadlines
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Protocol {
    Grpc,
    Http,
    Websocket,
}

#[derive(Args)]
struct HeadArgs {
    #[arg(long, default_value_t = 8081)]
    port: u16,
    #[arg(long, default_value = "head")]
    name: String,
    /// ANY, ALL, or a JSON endpoint map with a "*" wildcard
    #[arg(long, default_value = "ANY")]
    polling: String,
    /// JSON shard table, e.g. '{"0": ["127.0.0.1:9000", "127.0.0.1:9001"]}'
    #[arg(long)]
    connection_list: String,
    #[arg(long)]
    uses_before_address: Option<String>,
    #[arg(long)]
    uses_after_address: Option<String>,
    #[arg(long, default_value_t = 3, allow_hyphen_values = true)]
    retries: i32,
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Args)]
struct WorkerArgs {
    #[arg(long, default_value_t = 9000)]
    port: u16,
    /// Worker identity appended to routing traces (pod/type/shard)
    #[arg(long, default_value = "worker")]
    name: String,
    /// Registered executor reference
    #[arg(long, default_value = "identity")]
    uses: String,
    /// JSON init kwargs for the executor
    #[arg(long, default_value = "{}")]
    uses_with: String,
    /// JSON metadata for the executor
    #[arg(long, default_value = "{}")]
    uses_metas: String,
    /// JSON endpoint overrides, e.g. '{"/index": "bar"}'
    #[arg(long, default_value = "{}")]
    uses_requests: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        runtime::shutdown_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    match cli.command {
        Command::Gateway(args) => run_gateway(args, cancel).await,
        Command::Head(args) => run_head(args, cancel).await,
        Command::Worker(args) => run_worker(args, cancel).await,
    }
}

async fn run_gateway(args: GatewayArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let graph = TopologyGraph::from_json(&args.graph_description)
        .context("invalid --graph-description")?;
    let addresses = PodAddresses::from_json(&args.deployments_addresses)
        .context("invalid --deployments-addresses")?;
    let engine = Arc::new(
        GraphEngine::new(GatewayConfig {
            graph,
            addresses,
            retries: args.retries,
            prefetch: args.prefetch,
            timeout: args.timeout_ms.map(Duration::from_millis),
        })
        .context("topology validation failed")?,
    );

    let listener = runtime::bind(args.port).await.context("binding gateway port")?;
    match args.protocol {
        Protocol::Grpc => {
            runtime::serve_gateway_grpc(GrpcGateway::new(engine), listener, cancel)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        Protocol::Http => {
            runtime::serve_axum(gateway::http::router(engine), listener, cancel)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        Protocol::Websocket => {
            runtime::serve_axum(gateway::ws::router(engine), listener, cancel)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        }
    }
    info!("gateway stopped");
    Ok(())
}

async fn run_head(args: HeadArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let connections =
        ConnectionList::from_json(&args.connection_list).context("invalid --connection-list")?;
    let polling = PollingMap::parse(&args.polling).context("invalid --polling")?;
    let head = HeadRuntime::new(HeadConfig {
        name: args.name,
        connections,
        polling,
        uses_before: args.uses_before_address,
        uses_after: args.uses_after_address,
        retries: args.retries,
        timeout: args.timeout_ms.map(Duration::from_millis),
    });

    let listener = runtime::bind(args.port).await.context("binding head port")?;
    runtime::serve_single_data(head, listener, cancel)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    info!("head stopped");
    Ok(())
}

async fn run_worker(args: WorkerArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let uses_with: Parameters =
        serde_json::from_str(&args.uses_with).context("invalid --uses-with")?;
    let uses_metas: Parameters =
        serde_json::from_str(&args.uses_metas).context("invalid --uses-metas")?;
    let uses_requests: HashMap<String, String> =
        serde_json::from_str(&args.uses_requests).context("invalid --uses-requests")?;

    let executor = build_executor(&args.uses, uses_with, uses_metas, uses_requests, &args.name)
        .context("building executor")?;
    let worker = WorkerRuntime::new(args.name, executor);

    let listener = runtime::bind(args.port).await.context("binding worker port")?;
    runtime::serve_single_data(worker, listener, cancel)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    info!("worker stopped");
    Ok(())
}
