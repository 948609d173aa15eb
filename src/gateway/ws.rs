// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! WebSocket framing adapter: JSON request frames in, JSON response frames
//! out. The client half-closes with an `END` text frame; the socket stays
//! open until every outstanding response has been flushed.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::gateway::engine::GraphEngine;
use crate::proto::convert::{DataRequestJson, DataResponseJson};

/// Control frame ending the request half of the stream.
const END_FRAME: &str = "END";

pub fn router(engine: Arc<GraphEngine>) -> Router {
    Router::new().route("/", get(upgrade)).with_state(engine)
}

async fn upgrade(ws: WebSocketUpgrade, State(engine): State<Arc<GraphEngine>>) -> Response {
    ws.on_upgrade(move |socket| run(socket, engine))
}

async fn run(socket: WebSocket, engine: Arc<GraphEngine>) {
    let (mut sink, mut stream) = socket.split();
    let cancel = CancellationToken::new();

    let (req_tx, req_rx) = mpsc::channel(1);
    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if text == END_FRAME {
                        break;
                    }
                    match serde_json::from_str::<DataRequestJson>(&text) {
                        Ok(body) => {
                            if req_tx.send(body.into_request(None)).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            debug!(%err, "dropping malformed request frame");
                        }
                    }
                }
                Ok(Message::Close(_)) | Err(_) => {
                    reader_cancel.cancel();
                    break;
                }
                Ok(_) => {}
            }
        }
    });

    let mut out = engine.serve_stream(req_rx, cancel.clone());
    while let Some(resp) = out.recv().await {
        let frame = match serde_json::to_string(&DataResponseJson::from(resp)) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(%err, "failed to encode response frame");
                continue;
            }
        };
        if sink.send(Message::Text(frame)).await.is_err() {
            cancel.cancel();
            break;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}
