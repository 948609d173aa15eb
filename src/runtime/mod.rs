// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Shared serving scaffolding: listener binding, graceful shutdown, and
//! the readiness probe contract.

use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;
use tracing::info;

use crate::gateway::GrpcGateway;
use crate::proto::dataplane_v1::jina_rpc_server::JinaRpcServer;
use crate::proto::dataplane_v1::jina_single_data_request_rpc_server::{
    JinaSingleDataRequestRpc, JinaSingleDataRequestRpcServer,
};

pub type ServeError = Box<dyn std::error::Error + Send + Sync>;

/// Bind a listener; port 0 asks the OS for an ephemeral port.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port)).await
}

/// Serve a head or worker runtime until the token is cancelled.
pub async fn serve_single_data<S>(
    service: S,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<(), ServeError>
where
    S: JinaSingleDataRequestRpc,
{
    let addr = listener.local_addr()?;
    let incoming = TcpIncoming::from_listener(listener, true, None)?;
    info!(%addr, "serving single-data RPC");
    Server::builder()
        .add_service(JinaSingleDataRequestRpcServer::new(service))
        .serve_with_incoming_shutdown(incoming, cancel.cancelled_owned())
        .await?;
    Ok(())
}

/// Serve the gateway's gRPC surface until the token is cancelled.
pub async fn serve_gateway_grpc(
    gateway: GrpcGateway,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<(), ServeError> {
    let addr = listener.local_addr()?;
    let incoming = TcpIncoming::from_listener(listener, true, None)?;
    info!(%addr, "serving gateway (grpc)");
    Server::builder()
        .add_service(JinaRpcServer::new(gateway))
        .serve_with_incoming_shutdown(incoming, cancel.cancelled_owned())
        .await?;
    Ok(())
}

/// Serve an axum router (HTTP or WebSocket gateway) until the token is
/// cancelled.
pub async fn serve_axum(
    app: axum::Router,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<(), ServeError> {
    let addr = listener.local_addr()?;
    info!(%addr, "serving gateway (http/websocket)");
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

/// Readiness contract: repeatedly ping `address` until it accepts a
/// connection or the timeout elapses. Returns whether the peer came up.
pub async fn wait_for_ready_or_shutdown(address: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if TcpStream::connect(address).await.is_ok() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Resolves on SIGTERM or ctrl-c; both are clean shutdown causes.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing the SIGTERM handler cannot fail after startup");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn readiness_times_out_against_nothing() {
        assert!(!wait_for_ready_or_shutdown("127.0.0.1:1", Duration::from_millis(250)).await);
    }

    #[tokio::test]
    async fn readiness_sees_a_listener() {
        let listener = bind(0).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(wait_for_ready_or_shutdown(&addr.to_string(), Duration::from_secs(1)).await);
    }
}
