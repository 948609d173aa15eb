// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end scenarios: real gateway, head and worker runtimes on
//! ephemeral ports, talking gRPC to each other inside one test process.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{ConnectionList, Polling, PollingMap, TopologyGraph};
use crate::executor::{Executor, Handler, Identity, NameAppender, Parameters, Sleeper, TextSetter};
use crate::gateway::{GatewayConfig, GraphEngine, GrpcGateway};
use crate::head::{HeadConfig, HeadRuntime};
use crate::proto::dataplane_v1::jina_rpc_client::JinaRpcClient;
use crate::proto::dataplane_v1::jina_single_data_request_rpc_client::JinaSingleDataRequestRpcClient;
use crate::proto::dataplane_v1::jina_single_data_request_rpc_server::JinaSingleDataRequestRpc;
use crate::proto::{DataRequest, DataResponse, Document, StatusCode};
use crate::runtime;
use crate::worker::WorkerRuntime;

/// Serve a head or worker on an ephemeral port; returns its address.
async fn spawn_single_data<S>(service: S) -> (String, CancellationToken)
where
    S: JinaSingleDataRequestRpc,
{
    let listener = runtime::bind(0).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let cancel = CancellationToken::new();
    tokio::spawn(runtime::serve_single_data(service, listener, cancel.clone()));
    let address = format!("127.0.0.1:{port}");
    assert!(runtime::wait_for_ready_or_shutdown(&address, Duration::from_secs(5)).await);
    (address, cancel)
}

fn default_executor(handler: Arc<dyn Handler>) -> Executor {
    Executor::builder().add_default(handler).build().unwrap()
}

/// Three-handler executor: `foo` is the default, `bar` is reachable only
/// through an override, `foobar` is bound to `/1` and `/2`; launch-time
/// overrides rebind `/index` to `bar`.
fn overridden_executor() -> Executor {
    Executor::builder()
        .add_default(Arc::new(TextSetter::new("foo", "foo")))
        .add_unbound(Arc::new(TextSetter::new("bar", "bar")))
        .add_on(Arc::new(TextSetter::new("foobar", "foobar")), ["/1", "/2"])
        .with_overrides(HashMap::from([("/index".to_string(), "bar".to_string())]))
        .build()
        .unwrap()
}

async fn spawn_worker(name: &str, handler: Arc<dyn Handler>) -> (String, CancellationToken) {
    spawn_single_data(WorkerRuntime::new(name, default_executor(handler))).await
}

async fn spawn_head(
    name: &str,
    shards: BTreeMap<usize, Vec<String>>,
    polling: Polling,
) -> (String, CancellationToken) {
    spawn_single_data(HeadRuntime::new(HeadConfig {
        name: name.to_string(),
        connections: ConnectionList::from_shards(shards).unwrap(),
        polling: PollingMap::uniform(polling),
        uses_before: None,
        uses_after: None,
        retries: 3,
        timeout: Some(Duration::from_secs(5)),
    }))
    .await
}

fn engine(graph: &str, addresses: HashMap<String, Vec<String>>, prefetch: usize) -> Arc<GraphEngine> {
    Arc::new(
        GraphEngine::new(GatewayConfig {
            graph: TopologyGraph::from_json(graph).unwrap(),
            addresses: addresses.into(),
            retries: 3,
            prefetch,
            timeout: Some(Duration::from_secs(5)),
        })
        .unwrap(),
    )
}

fn request(text: &str) -> DataRequest {
    DataRequest::new(
        "/",
        vec![Document {
            text: text.to_string(),
            ..Default::default()
        }],
    )
}

const TRIVIAL_GRAPH: &str = r#"{"start-gateway": ["pod0"], "pod0": ["end-gateway"]}"#;

#[tokio::test]
async fn trivial_topology_round_trips_twenty_requests() {
    let (worker_addr, _w) = spawn_worker("pod0/0", Arc::new(Identity)).await;
    let (head_addr, _h) =
        spawn_head("pod0/head", BTreeMap::from([(0, vec![worker_addr])]), Polling::Any).await;
    let engine = engine(
        TRIVIAL_GRAPH,
        HashMap::from([("pod0".to_string(), vec![head_addr])]),
        0,
    );

    for _ in 0..20 {
        let responses = engine.process_one(request("client0-Request")).await;
        assert_eq!(responses.len(), 1);
        let resp = &responses[0];
        assert_eq!(resp.docs.len(), 1);
        assert_eq!(resp.docs[0].text, "client0-Request");
        assert_eq!(resp.status_code(), StatusCode::Success);
        // trace: gateway plus the worker that served the request
        let visited: Vec<&str> = resp.routes.iter().map(|r| r.pod.as_str()).collect();
        assert_eq!(visited, vec!["gateway", "pod0/0"]);
    }
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn shards_all_appends_one_doc_per_shard() {
    let mut shards = BTreeMap::new();
    let mut guards = Vec::new();
    for i in 0..10 {
        let name = format!("pod0/shard/{i}");
        let (addr, guard) = spawn_worker(&name, Arc::new(NameAppender::new(&name))).await;
        shards.insert(i, vec![addr]);
        guards.push(guard);
    }
    let (head_addr, _h) = spawn_head("pod0/head", shards, Polling::All).await;
    let engine = engine(
        TRIVIAL_GRAPH,
        HashMap::from([("pod0".to_string(), vec![head_addr])]),
        0,
    );

    let responses = engine.process_one(request("seed")).await;
    assert_eq!(responses.len(), 1);
    let resp = &responses[0];
    // the input doc collapses at the merge; every shard appends one
    assert_eq!(resp.docs.len(), 11);
    assert_eq!(resp.docs[0].text, "seed");

    let mut appended: Vec<String> = resp.docs[1..].iter().map(|d| d.text.clone()).collect();
    appended.sort();
    let mut expected: Vec<String> = (0..10).map(|i| format!("pod0/shard/{i}")).collect();
    expected.sort();
    assert_eq!(appended, expected);
}

#[tokio::test]
async fn shards_any_round_robins_across_shards() {
    let mut shards = BTreeMap::new();
    let mut guards = Vec::new();
    for i in 0..10 {
        let name = format!("pod0/shard/{i}");
        let (addr, guard) = spawn_worker(&name, Arc::new(NameAppender::new(&name))).await;
        shards.insert(i, vec![addr]);
        guards.push(guard);
    }
    let (head_addr, _h) = spawn_head("pod0/head", shards, Polling::Any).await;
    let engine = engine(
        TRIVIAL_GRAPH,
        HashMap::from([("pod0".to_string(), vec![head_addr])]),
        0,
    );

    let mut served: HashMap<String, usize> = HashMap::new();
    for _ in 0..20 {
        let responses = engine.process_one(request("seed")).await;
        assert_eq!(responses.len(), 1);
        let resp = &responses[0];
        // exactly one shard served the request
        assert_eq!(resp.docs.len(), 2);
        *served.entry(resp.docs[1].text.clone()).or_default() += 1;
    }

    // 20 sequential requests over 10 shards: round-robin fairness within ±1
    assert_eq!(served.len(), 10);
    for (shard, count) in &served {
        assert!(
            (1..=3).contains(count),
            "shard {shard} served {count} of 20 requests"
        );
    }
}

#[tokio::test]
async fn replicas_process_in_parallel() {
    let mut replicas = Vec::new();
    let mut guards = Vec::new();
    for i in 0..4 {
        let (addr, guard) = spawn_worker(
            &format!("pod0/{i}"),
            Arc::new(Sleeper::new(Duration::from_millis(500))),
        )
        .await;
        replicas.push(addr);
        guards.push(guard);
    }
    let (head_addr, _h) =
        spawn_head("pod0/head", BTreeMap::from([(0, replicas)]), Polling::Any).await;
    let engine = engine(
        TRIVIAL_GRAPH,
        HashMap::from([("pod0".to_string(), vec![head_addr])]),
        0,
    );

    let slow_engine = Arc::clone(&engine);
    let slow = tokio::spawn(async move { slow_engine.process_one(request("slow")).await });
    // give the slow request a head start onto its replica
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let fast = engine.process_one(request("fast")).await;
    let fast_elapsed = started.elapsed();

    assert_eq!(fast[0].docs[0].text, "fast");
    assert!(
        fast_elapsed < Duration::from_millis(400),
        "fast request waited on the slow replica: {fast_elapsed:?}"
    );
    let slow = slow.await.unwrap();
    assert_eq!(slow[0].docs[0].text, "slow");
}

/// Counts invocations and appends a marker document.
struct CountingMarker {
    marker: String,
    hits: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler for CountingMarker {
    async fn handle(
        &self,
        mut docs: Vec<Document>,
        _parameters: &Parameters,
    ) -> anyhow::Result<Vec<Document>> {
        self.hits.fetch_add(1, Ordering::AcqRel);
        docs.push(Document {
            text: self.marker.clone(),
            ..Default::default()
        });
        Ok(docs)
    }

    fn name(&self) -> &str {
        "counting_marker"
    }
}

#[tokio::test]
async fn complex_dag_with_hanging_pod() {
    // start -> {pod0, pod4, pod6}; pod0 -> {pod1, pod2}; pod2 -> pod3;
    // pod4 -> pod5; {pod3, pod5} -> merger -> pod_last -> end.
    // pod1 and pod6 hang: invoked, never surfaced.
    let graph = r#"{
        "start-gateway": ["pod0", "pod4", "pod6"],
        "pod0": ["pod1", "pod2"],
        "pod1": [],
        "pod2": ["pod3"],
        "pod3": ["merger"],
        "pod4": ["pod5"],
        "pod5": ["merger"],
        "pod6": [],
        "merger": ["pod_last"],
        "pod_last": ["end-gateway"]
    }"#;

    let hanging_hits = Arc::new(AtomicUsize::new(0));
    let mut addresses = HashMap::new();
    let mut guards = Vec::new();
    for pod in ["pod0", "pod1", "pod2", "pod3", "pod4", "pod5", "merger", "pod_last"] {
        let (addr, guard) = spawn_worker(&format!("{pod}/0"), Arc::new(Identity)).await;
        addresses.insert(pod.to_string(), vec![addr]);
        guards.push(guard);
    }
    let (addr, guard) = spawn_worker(
        "pod6/0",
        Arc::new(CountingMarker {
            marker: "pod6-secret".to_string(),
            hits: Arc::clone(&hanging_hits),
        }),
    )
    .await;
    addresses.insert("pod6".to_string(), vec![addr]);
    guards.push(guard);

    let engine = engine(graph, addresses, 0);
    for _ in 0..20 {
        let responses = engine.process_one(request("client0-Request")).await;
        // only pod_last feeds end-gateway
        assert_eq!(responses.len(), 1);
        let resp = &responses[0];
        assert_eq!(resp.status_code(), StatusCode::Success);
        assert!(
            resp.docs.iter().all(|d| d.text != "pod6-secret"),
            "hanging pod output leaked into the client response"
        );
        // the two merged branches collapse to the one seed document
        assert_eq!(resp.docs.len(), 1);
    }
    assert_eq!(hanging_hits.load(Ordering::Acquire), 20);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn uses_before_and_after_wrap_the_dispatch() {
    let (before_addr, _b) =
        spawn_worker("pod0/uses_before", Arc::new(NameAppender::new("uses-before"))).await;
    let (after_addr, _a) =
        spawn_worker("pod0/uses_after", Arc::new(NameAppender::new("uses-after"))).await;
    let (shard_addr, _s) = spawn_worker("pod0/0", Arc::new(NameAppender::new("shard-0"))).await;

    let (head_addr, _h) = spawn_single_data(HeadRuntime::new(HeadConfig {
        name: "pod0/head".to_string(),
        connections: ConnectionList::from_shards(BTreeMap::from([(0, vec![shard_addr])])).unwrap(),
        polling: PollingMap::uniform(Polling::Any),
        uses_before: Some(before_addr),
        uses_after: Some(after_addr),
        retries: 3,
        timeout: Some(Duration::from_secs(5)),
    }))
    .await;
    let engine = engine(
        TRIVIAL_GRAPH,
        HashMap::from([("pod0".to_string(), vec![head_addr])]),
        0,
    );

    let responses = engine.process_one(request("seed")).await;
    let texts: Vec<&str> = responses[0].docs.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(texts, vec!["seed", "uses-before", "shard-0", "uses-after"]);
}

#[tokio::test]
async fn override_endpoint_binding_over_live_rpc() {
    let worker = WorkerRuntime::new("pod0/0", overridden_executor());
    let (address, _w) = spawn_single_data(worker).await;

    let mut client = JinaSingleDataRequestRpcClient::connect(format!("http://{address}"))
        .await
        .unwrap();
    for (endpoint, expected) in [
        ("/index", "bar"),
        ("/1", "foobar"),
        ("/2", "foobar"),
        ("/default-unknown", "foo"),
    ] {
        let resp = client
            .process_single_data(DataRequest::new(endpoint, vec![Document::default()]))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(
            resp.docs[0].text, expected,
            "endpoint {endpoint} resolved to the wrong handler"
        );
        assert_eq!(resp.status_code(), StatusCode::Success);
    }
}

#[tokio::test]
async fn prefetch_caps_in_flight_requests() {
    let (worker_addr, _w) = spawn_worker(
        "pod0/0",
        Arc::new(Sleeper::new(Duration::from_millis(150))),
    )
    .await;
    let (head_addr, _h) =
        spawn_head("pod0/head", BTreeMap::from([(0, vec![worker_addr])]), Polling::Any).await;
    let engine = engine(
        TRIVIAL_GRAPH,
        HashMap::from([("pod0".to_string(), vec![head_addr])]),
        2,
    );

    let (req_tx, req_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        for _ in 0..8 {
            if req_tx.send(request("slow")).await.is_err() {
                return;
            }
        }
    });

    let mut out = engine.serve_stream(req_rx, CancellationToken::new());
    let mut received = 0;
    loop {
        tokio::select! {
            resp = out.recv() => match resp {
                Some(_) => received += 1,
                None => break,
            },
            _ = tokio::time::sleep(Duration::from_millis(20)) => {
                assert!(
                    engine.in_flight() <= 2,
                    "prefetch=2 exceeded: {} in flight",
                    engine.in_flight()
                );
            }
        }
    }
    assert_eq!(received, 8);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn cancellation_drains_in_flight_to_zero() {
    let (worker_addr, _w) = spawn_worker(
        "pod0/0",
        Arc::new(Sleeper::new(Duration::from_secs(5))),
    )
    .await;
    let (head_addr, _h) =
        spawn_head("pod0/head", BTreeMap::from([(0, vec![worker_addr])]), Polling::Any).await;
    let engine = engine(
        TRIVIAL_GRAPH,
        HashMap::from([("pod0".to_string(), vec![head_addr])]),
        0,
    );

    let (req_tx, req_rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let mut out = engine.serve_stream(req_rx, cancel.clone());

    for _ in 0..3 {
        req_tx.send(request("slow")).await.unwrap();
    }
    // wait until the requests are actually walking the graph
    let admitted = Instant::now();
    while engine.in_flight() < 3 {
        assert!(admitted.elapsed() < Duration::from_secs(2), "requests never admitted");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    assert!(out.recv().await.is_none(), "no responses after cancellation");
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn grpc_gateway_streams_end_to_end() {
    let (worker_addr, _w) = spawn_worker("pod0/0", Arc::new(Identity)).await;
    let (head_addr, _h) =
        spawn_head("pod0/head", BTreeMap::from([(0, vec![worker_addr])]), Polling::Any).await;
    let engine = engine(
        TRIVIAL_GRAPH,
        HashMap::from([("pod0".to_string(), vec![head_addr])]),
        0,
    );

    let listener = runtime::bind(0).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let cancel = CancellationToken::new();
    tokio::spawn(runtime::serve_gateway_grpc(
        GrpcGateway::new(engine),
        listener,
        cancel.clone(),
    ));
    let address = format!("127.0.0.1:{port}");
    assert!(runtime::wait_for_ready_or_shutdown(&address, Duration::from_secs(5)).await);

    let mut client = JinaRpcClient::connect(format!("http://{address}")).await.unwrap();
    let requests: Vec<DataRequest> = (0..20).map(|_| request("client0-Request")).collect();
    let mut inbound = client
        .call(tokio_stream::iter(requests))
        .await
        .unwrap()
        .into_inner();

    let mut responses: Vec<DataResponse> = Vec::new();
    while let Some(resp) = inbound.message().await.unwrap() {
        responses.push(resp);
    }
    assert_eq!(responses.len(), 20);
    for resp in &responses {
        assert_eq!(resp.docs.len(), 1);
        assert_eq!(resp.docs[0].text, "client0-Request");
        assert_eq!(resp.status_code(), StatusCode::Success);
    }
    cancel.cancel();
}

#[tokio::test]
async fn http_gateway_serves_post_endpoint() {
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let (worker_addr, _w) = spawn_worker("pod0/0", Arc::new(Identity)).await;
    let (head_addr, _h) =
        spawn_head("pod0/head", BTreeMap::from([(0, vec![worker_addr])]), Polling::Any).await;
    let engine = engine(
        TRIVIAL_GRAPH,
        HashMap::from([("pod0".to_string(), vec![head_addr])]),
        0,
    );

    let app = crate::gateway::http::router(engine);
    let response = app
        .oneshot(
            axum::http::Request::post("/search")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(
                    r#"{"data": [{"text": "hello"}], "parameters": {"top_k": 3}}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"][0]["text"], "hello");
    assert_eq!(json["status"]["code"], "SUCCESS");
    assert_eq!(json["routes"][0]["pod"], "gateway");
}

#[tokio::test]
async fn websocket_gateway_round_trips_frames() {
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let (worker_addr, _w) = spawn_worker("pod0/0", Arc::new(Identity)).await;
    let (head_addr, _h) =
        spawn_head("pod0/head", BTreeMap::from([(0, vec![worker_addr])]), Polling::Any).await;
    let engine = engine(
        TRIVIAL_GRAPH,
        HashMap::from([("pod0".to_string(), vec![head_addr])]),
        0,
    );

    let listener = runtime::bind(0).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let cancel = CancellationToken::new();
    tokio::spawn(runtime::serve_axum(
        crate::gateway::ws::router(engine),
        listener,
        cancel.clone(),
    ));
    let address = format!("127.0.0.1:{port}");
    assert!(runtime::wait_for_ready_or_shutdown(&address, Duration::from_secs(5)).await);

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{address}/"))
        .await
        .unwrap();
    socket
        .send(Message::Text(
            r#"{"header": {"exec_endpoint": "/search"}, "data": [{"text": "hello"}]}"#.to_string(),
        ))
        .await
        .unwrap();
    socket.send(Message::Text("END".to_string())).await.unwrap();

    let mut docs_seen = 0;
    while let Some(frame) = socket.next().await {
        match frame.unwrap() {
            Message::Text(text) => {
                let json: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(json["data"][0]["text"], "hello");
                docs_seen += 1;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    assert_eq!(docs_seen, 1);
    cancel.cancel();
}
