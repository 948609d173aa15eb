// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! HTTP framing adapter: `POST /{endpoint}` with a JSON document list,
//! one merged response body per request.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use crate::gateway::engine::GraphEngine;
use crate::proto::convert::{DataRequestJson, DataResponseJson};
use crate::proto::{merge_responses, DataResponse, Status};

pub fn router(engine: Arc<GraphEngine>) -> Router {
    Router::new()
        .route("/*endpoint", post(handle))
        .with_state(engine)
}

async fn handle(
    State(engine): State<Arc<GraphEngine>>,
    Path(endpoint): Path<String>,
    Json(body): Json<DataRequestJson>,
) -> Json<DataResponseJson> {
    let request = body.into_request(Some(&format!("/{endpoint}")));
    let responses = engine.process_one(request.clone()).await;
    let merged = if responses.is_empty() {
        // every path was hanging; there is nothing to return but the trace
        DataResponse::error_from_request(
            request,
            Status::error("request produced no response", ""),
        )
    } else {
        merge_responses(responses)
    };
    Json(DataResponseJson::from(merged))
}
