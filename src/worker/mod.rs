// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Worker runtime: hosts one executor and serves the single-data RPC.
//!
//! Dispatch per request:
//!
//! 1. Resolve the request endpoint against the executor's endpoint table
//!    (explicit binding, else the default handler, else pass-through).
//! 2. Apply the handler to the document list and parameters.
//! 3. Append the worker's name to the routing trace.
//! 4. Return the request as a response. Handler failures become an ERROR
//!    status on the response; the request still flows forward so heads can
//!    merge partial results.

use tonic::{Request, Response};
use tracing::{debug, warn};

use crate::executor::Executor;
use crate::proto::convert::struct_to_json;
use crate::proto::dataplane_v1::jina_single_data_request_rpc_server::JinaSingleDataRequestRpc;
use crate::proto::{DataRequest, DataResponse, Status};

pub struct WorkerRuntime {
    name: String,
    executor: Executor,
}

impl WorkerRuntime {
    pub fn new(name: impl Into<String>, executor: Executor) -> Self {
        Self {
            name: name.into(),
            executor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn process(&self, mut req: DataRequest) -> DataResponse {
        let endpoint = req.endpoint().to_string();
        let Some(handler) = self.executor.resolve(&endpoint) else {
            // No binding and no default: the request passes through unchanged.
            debug!(worker = %self.name, %endpoint, "no handler bound, passing through");
            req.add_route(&self.name, Status::success());
            return DataResponse::from_request(req);
        };

        let parameters = req
            .parameters
            .clone()
            .map(struct_to_json)
            .unwrap_or_default();
        let docs = std::mem::take(&mut req.docs);
        let snapshot = docs.clone();

        match handler.handle(docs, &parameters).await {
            Ok(docs) => {
                req.docs = docs;
                req.add_route(&self.name, Status::success());
                DataResponse::from_request(req)
            }
            Err(err) => {
                warn!(worker = %self.name, %endpoint, error = %err, "handler failed");
                // The handler consumed the list; restore the pre-call
                // documents so downstream pods still see the request.
                req.docs = snapshot;
                let status = Status::error(err.to_string(), "HandlerError");
                req.add_route(&self.name, status.clone());
                DataResponse::error_from_request(req, status)
            }
        }
    }
}

#[tonic::async_trait]
impl JinaSingleDataRequestRpc for WorkerRuntime {
    async fn process_single_data(
        &self,
        request: Request<DataRequest>,
    ) -> Result<Response<DataResponse>, tonic::Status> {
        Ok(Response::new(self.process(request.into_inner()).await))
    }
}
