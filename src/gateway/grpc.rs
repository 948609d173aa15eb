// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! gRPC framing adapter: bidi stream in, bidi stream out.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Streaming};
use tracing::debug;

use crate::gateway::engine::GraphEngine;
use crate::proto::dataplane_v1::jina_rpc_server::JinaRpc;
use crate::proto::{DataRequest, DataResponse};

pub struct GrpcGateway {
    engine: Arc<GraphEngine>,
}

impl GrpcGateway {
    pub fn new(engine: Arc<GraphEngine>) -> Self {
        Self { engine }
    }
}

#[tonic::async_trait]
impl JinaRpc for GrpcGateway {
    type CallStream = ReceiverStream<Result<DataResponse, tonic::Status>>;

    async fn call(
        &self,
        request: Request<Streaming<DataRequest>>,
    ) -> Result<Response<Self::CallStream>, tonic::Status> {
        let mut inbound = request.into_inner();
        let cancel = CancellationToken::new();

        // Inbound pump: client stream -> engine. A stream error is a client
        // disconnect and cancels the whole connection.
        let (req_tx, req_rx) = mpsc::channel(1);
        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(req)) => {
                        if req_tx.send(req).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        debug!(%status, "client request stream failed");
                        reader_cancel.cancel();
                        break;
                    }
                }
            }
        });

        // Outbound pump: engine -> response stream. The receiver half is
        // dropped by tonic when the client goes away; that cancels too.
        let mut out = self.engine.serve_stream(req_rx, cancel.clone());
        let (resp_tx, resp_rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(resp) = out.recv().await {
                if resp_tx.send(Ok(resp)).await.is_err() {
                    cancel.cancel();
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(resp_rx)))
    }
}
