// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Head runtime: fronts one pod's shards and replicas.
//!
//! One request in, one merged response out:
//!
//! 1. *uses-before* pre-processor, when configured.
//! 2. Polling resolution for the request endpoint (ANY or ALL).
//! 3. Dispatch: ANY picks one shard round-robin for the life of the
//!    request (walking to the next shard only while the retry budget
//!    lasts); ALL scatters to every shard concurrently. Replica choice
//!    inside a shard is round-robin with transient failures retried on the
//!    next replica.
//! 4. Merge in shard-index order; a failed shard under ALL contributes an
//!    error flag, not an abort.
//! 5. *uses-after* reducer, when configured; its reply is authoritative.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future;
use tonic::{Request, Response};
use tracing::debug;

use crate::config::{ConnectionList, Polling, PollingMap};
use crate::errors::DataPlaneError;
use crate::net::{ConnectionPool, ReplicaSet};
use crate::observability::messages::net::ShardExhausted;
use crate::observability::StructuredLog;
use crate::proto::dataplane_v1::jina_single_data_request_rpc_server::JinaSingleDataRequestRpc;
use crate::proto::{merge_responses, DataRequest, DataResponse, Status};

pub struct HeadConfig {
    pub name: String,
    pub connections: ConnectionList,
    pub polling: PollingMap,
    pub uses_before: Option<String>,
    pub uses_after: Option<String>,
    pub retries: i32,
    pub timeout: Option<Duration>,
}

pub struct HeadRuntime {
    name: String,
    pool: ConnectionPool,
    shards: Vec<(usize, ReplicaSet)>,
    shard_cursor: AtomicUsize,
    polling: PollingMap,
    uses_before: Option<ReplicaSet>,
    uses_after: Option<ReplicaSet>,
    retries: i32,
}

impl HeadRuntime {
    pub fn new(config: HeadConfig) -> Self {
        let pool = ConnectionPool::new(config.timeout);
        pool.warm_up(config.connections.all_addresses());
        let shards = config
            .connections
            .shards()
            .map(|shard| {
                let replicas = config.connections.replicas(shard).to_vec();
                (shard, ReplicaSet::new(replicas))
            })
            .collect();
        Self {
            name: config.name,
            pool,
            shards,
            shard_cursor: AtomicUsize::new(0),
            polling: config.polling,
            uses_before: config.uses_before.map(|a| ReplicaSet::new(vec![a])),
            uses_after: config.uses_after.map(|a| ReplicaSet::new(vec![a])),
            retries: config.retries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn process(&self, req: DataRequest) -> DataResponse {
        // Pre-processing: the uses-before reply becomes the working request.
        let req = match &self.uses_before {
            Some(before) => match self.pool.call_replicas(before, req.clone(), self.retries).await {
                Ok(resp) => resp.into_request(),
                Err(err) => {
                    return DataResponse::error_from_request(
                        req,
                        Status::error(format!("uses_before failed: {err}"), ""),
                    )
                }
            },
            None => req,
        };

        let polling = self.polling.resolve(req.endpoint());
        debug!(head = %self.name, endpoint = %req.endpoint(), ?polling, "dispatching");
        let merged = match polling {
            Polling::Any => self.dispatch_any(req).await,
            Polling::All => self.dispatch_all(req).await,
        };

        // Post-processing: the uses-after reply is authoritative.
        match &self.uses_after {
            Some(after) => {
                match self
                    .pool
                    .call_replicas(after, merged.clone().into_request(), self.retries)
                    .await
                {
                    Ok(resp) => resp,
                    Err(err) => DataResponse::error_from_request(
                        merged.into_request(),
                        Status::error(format!("uses_after failed: {err}"), ""),
                    ),
                }
            }
            None => merged,
        }
    }

    /// ANY: one shard serves the request, fixed round-robin for the
    /// request's life. Replicas inside the shard are retried on transient
    /// failures; once a full replica round has failed the dispatch walks to
    /// the next shard, as long as the overall retry budget lasts.
    async fn dispatch_any(&self, req: DataRequest) -> DataResponse {
        let start = self.shard_cursor.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        let mut failures = 0usize;
        let mut last_status: Option<tonic::Status> = None;
        for offset in 0..self.shards.len() {
            let (shard, replicas) = &self.shards[(start + offset) % self.shards.len()];
            let mut shard_failures = 0usize;
            loop {
                let address = self.pool.pick(replicas);
                match self.pool.call(&address, req.clone()).await {
                    Ok(resp) => return resp,
                    Err(status) if crate::errors::is_transient(&status) => {
                        failures += 1;
                        shard_failures += 1;
                        if !crate::net::budget_allows(self.retries, failures) {
                            ShardExhausted {
                                pod: &self.name,
                                shard: *shard,
                                attempts: failures,
                            }
                            .log();
                            let err = DataPlaneError::RetriesExhausted {
                                shard: *shard,
                                attempts: failures,
                                last: status,
                            };
                            return DataResponse::error_from_request(
                                req,
                                Status::error(err.to_string(), ""),
                            );
                        }
                        last_status = Some(status);
                        if shard_failures >= replicas.len() {
                            ShardExhausted {
                                pod: &self.name,
                                shard: *shard,
                                attempts: shard_failures,
                            }
                            .log();
                            break;
                        }
                    }
                    Err(status) => {
                        return DataResponse::error_from_request(
                            req,
                            Status::error(
                                format!("pod call failed on {address}: {status}"),
                                "",
                            ),
                        )
                    }
                }
            }
        }
        let detail = last_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "no shards configured".to_string());
        DataResponse::error_from_request(
            req,
            Status::error(format!("all shards failed: {detail}"), ""),
        )
    }

    /// ALL: scatter to every shard concurrently, gather in shard-index
    /// order. A failed shard contributes an error flag to the merge.
    async fn dispatch_all(&self, req: DataRequest) -> DataResponse {
        let calls = self.shards.iter().map(|(shard, replicas)| {
            let req = req.clone();
            async move {
                (
                    *shard,
                    self.pool.call_replicas(replicas, req, self.retries).await,
                )
            }
        });
        let results = future::join_all(calls).await;

        let mut parts = Vec::with_capacity(results.len());
        for (shard, result) in results {
            match result {
                Ok(resp) => parts.push(resp),
                Err(err) => {
                    ShardExhausted {
                        pod: &self.name,
                        shard,
                        attempts: 0,
                    }
                    .log();
                    // No docs: the surviving shards already carry the
                    // request documents into the merge.
                    let mut failed = DataRequest::new(req.endpoint(), Vec::new());
                    failed.header = req.header.clone();
                    parts.push(DataResponse::error_from_request(
                        failed,
                        Status::error(format!("shard {shard} failed: {err}"), ""),
                    ));
                }
            }
        }
        merge_responses(parts)
    }
}

#[tonic::async_trait]
impl JinaSingleDataRequestRpc for HeadRuntime {
    async fn process_single_data(
        &self,
        request: Request<DataRequest>,
    ) -> Result<Response<DataResponse>, tonic::Status> {
        Ok(Response::new(self.process(request.into_inner()).await))
    }
}
