// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Transport-agnostic graph traversal engine.
//!
//! The engine consumes a stream of requests and produces a stream of
//! responses; the gRPC, HTTP and WebSocket gateways are thin framing
//! adapters around it.
//!
//! Per request, the walk is one task per pod. Each pod task:
//!
//! 1. awaits one input per incoming edge (a oneshot per predecessor, plus
//!    the raw request for roots),
//! 2. merges the inputs in deterministic order (raw request first, then
//!    predecessors lexicographically),
//! 3. calls the pod's head (round-robin over its addresses, transient
//!    failures retried within the budget),
//! 4. hands the response to every successor edge; edges into `end-gateway`
//!    emit to the client stream, hanging pods emit nowhere.
//!
//! A pod failure never aborts the walk: the error status is folded into a
//! response that keeps flowing forward. Cancellation (client disconnect)
//! aborts all per-request tasks; dropping a task's `JoinSet` aborts its
//! pod tasks in turn, abandoning outstanding RPCs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::consts::END_GATEWAY;
use crate::config::{PodAddresses, TopologyGraph};
use crate::errors::TopologyError;
use crate::gateway::stream::{InFlight, PrefetchGate};
use crate::net::{ConnectionPool, ReplicaSet};
use crate::observability::messages::gateway::{
    ClientDisconnected, HangingPodFailed, PodCallFailed, RequestAdmitted,
};
use crate::observability::StructuredLog;
use crate::proto::{
    assign_missing_doc_ids, merge_responses, DataRequest, DataResponse, Status,
};

pub struct GatewayConfig {
    pub graph: TopologyGraph,
    pub addresses: PodAddresses,
    pub retries: i32,
    pub prefetch: usize,
    pub timeout: Option<Duration>,
}

pub struct GraphEngine {
    graph: TopologyGraph,
    pods: HashMap<String, Arc<ReplicaSet>>,
    pool: ConnectionPool,
    retries: i32,
    prefetch: PrefetchGate,
    in_flight: InFlight,
}

impl GraphEngine {
    pub fn new(config: GatewayConfig) -> Result<Self, TopologyError> {
        config.addresses.validate_against(&config.graph)?;
        let pods = config
            .graph
            .pods()
            .iter()
            .map(|pod| {
                let addrs = config
                    .addresses
                    .get(pod)
                    .expect("validated above")
                    .to_vec();
                (pod.clone(), Arc::new(ReplicaSet::new(addrs)))
            })
            .collect();
        Ok(Self {
            graph: config.graph,
            pods,
            pool: ConnectionPool::new(config.timeout),
            retries: config.retries,
            prefetch: PrefetchGate::new(config.prefetch),
            in_flight: InFlight::default(),
        })
    }

    /// Requests currently walking the graph. Exposed for back-pressure
    /// verification.
    pub fn in_flight(&self) -> usize {
        self.in_flight.current()
    }

    /// Drive a request stream to completion. Responses arrive on the
    /// returned channel in completion order, not submission order. The
    /// channel closes once every admitted request has finished (or the
    /// token is cancelled).
    pub fn serve_stream(
        self: &Arc<Self>,
        mut requests: mpsc::Receiver<DataRequest>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<DataResponse> {
        let (out_tx, out_rx) = mpsc::channel(64);
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut walks: JoinSet<()> = JoinSet::new();
            loop {
                // Back-pressure: hold a slot before reading the next request.
                let permit = tokio::select! {
                    permit = engine.prefetch.admit() => permit,
                    _ = cancel.cancelled() => break,
                };
                let request = tokio::select! {
                    request = requests.recv() => request,
                    _ = cancel.cancelled() => break,
                };
                let Some(request) = request else { break };

                let guard = engine.in_flight.begin();
                RequestAdmitted {
                    request_id: request.request_id(),
                    endpoint: request.endpoint(),
                    in_flight: engine.in_flight.current(),
                }
                .log();
                let engine = Arc::clone(&engine);
                let out_tx = out_tx.clone();
                walks.spawn(async move {
                    engine.walk(request, out_tx).await;
                    drop(guard);
                    drop(permit);
                });
            }

            if cancel.is_cancelled() {
                ClientDisconnected {
                    in_flight: engine.in_flight.current(),
                }
                .log();
                walks.abort_all();
            }
            while walks.join_next().await.is_some() {}
        });
        out_rx
    }

    /// Convenience for request/response transports: walk a single request
    /// and collect every response it produces.
    pub async fn process_one(self: &Arc<Self>, request: DataRequest) -> Vec<DataResponse> {
        let (req_tx, req_rx) = mpsc::channel(1);
        req_tx.send(request).await.ok();
        drop(req_tx);
        let mut out = self.serve_stream(req_rx, CancellationToken::new());
        let mut responses = Vec::new();
        while let Some(resp) = out.recv().await {
            responses.push(resp);
        }
        responses
    }

    /// One request's traversal: wire up the per-edge channels, spawn the
    /// pod tasks, seed the roots, wait for the walk to drain.
    async fn walk(self: Arc<Self>, mut request: DataRequest, out_tx: mpsc::Sender<DataResponse>) {
        assign_missing_doc_ids(&mut request);
        request.add_route("gateway", Status::success());

        enum Outgoing {
            Pod(oneshot::Sender<DataResponse>),
            End,
        }

        let mut incoming: HashMap<&str, Vec<oneshot::Receiver<DataResponse>>> = HashMap::new();
        let mut outgoing: HashMap<&str, Vec<Outgoing>> = HashMap::new();
        let mut start_edges: Vec<oneshot::Sender<DataResponse>> = Vec::new();

        // Root edges first so the raw request merges ahead of predecessors.
        for root in self.graph.roots() {
            let (tx, rx) = oneshot::channel();
            start_edges.push(tx);
            incoming.entry(root.as_str()).or_default().push(rx);
        }
        // Pods iterate in sorted order, so each pod's receivers line up
        // with its lexicographically sorted predecessor list.
        for pod in self.graph.pods() {
            for succ in self.graph.successors(pod) {
                if succ == END_GATEWAY {
                    outgoing.entry(pod.as_str()).or_default().push(Outgoing::End);
                } else {
                    let (tx, rx) = oneshot::channel();
                    outgoing.entry(pod.as_str()).or_default().push(Outgoing::Pod(tx));
                    incoming.entry(succ.as_str()).or_default().push(rx);
                }
            }
        }

        let mut tasks: JoinSet<()> = JoinSet::new();
        for pod in self.graph.pods() {
            let inputs = incoming.remove(pod.as_str()).unwrap_or_default();
            let outputs = outgoing.remove(pod.as_str()).unwrap_or_default();
            let replicas = Arc::clone(&self.pods[pod]);
            let engine = Arc::clone(&self);
            let pod = pod.clone();
            let out_tx = out_tx.clone();
            tasks.spawn(async move {
                let mut parts = Vec::with_capacity(inputs.len());
                for input in inputs {
                    // A closed edge means the predecessor task was aborted;
                    // nothing to merge from it.
                    if let Ok(part) = input.await {
                        parts.push(part);
                    }
                }
                if parts.is_empty() {
                    return;
                }
                let merged = merge_responses(parts);
                let req = merged.into_request();
                let hanging = outputs.is_empty();
                let response = match engine
                    .pool
                    .call_replicas(&replicas, req.clone(), engine.retries)
                    .await
                {
                    Ok(resp) => resp,
                    Err(err) => {
                        if hanging {
                            HangingPodFailed {
                                request_id: req.request_id(),
                                pod: &pod,
                                error: &err,
                            }
                            .log();
                        } else {
                            PodCallFailed {
                                request_id: req.request_id(),
                                pod: &pod,
                                error: &err,
                            }
                            .log();
                        }
                        DataResponse::error_from_request(req, Status::error(err.to_string(), ""))
                    }
                };
                for output in outputs {
                    match output {
                        Outgoing::Pod(tx) => {
                            // the successor may already be gone on abort
                            let _ = tx.send(response.clone());
                        }
                        Outgoing::End => {
                            if out_tx.send(response.clone()).await.is_err() {
                                debug!(pod = %pod, "client output closed, dropping response");
                            }
                        }
                    }
                }
            });
        }

        let seed = DataResponse::from_request(request);
        for edge in start_edges {
            let _ = edge.send(seed.clone());
        }
        drop(out_tx);

        while tasks.join_next().await.is_some() {}
    }
}
