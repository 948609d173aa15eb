// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Long-lived connection pool over the single-data-request RPC.
//!
//! Channels are created lazily and shared by cheap clones. A failed call
//! marks its address unhealthy and kicks off one background probe that
//! re-dials with exponential backoff until the peer answers again; healthy
//! traffic never waits on probing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tracing::{debug, warn};

use crate::errors::{is_transient, DataPlaneError};
use crate::net::backoff::{Backoff, BackoffConfig};
use crate::proto::dataplane_v1::jina_single_data_request_rpc_client::JinaSingleDataRequestRpcClient;
use crate::proto::{DataRequest, DataResponse};

/// Delay inserted after a full fruitless round over a replica set, so an
/// unlimited retry budget cannot busy-spin against dead peers.
const RETRY_ROUND_DELAY: Duration = Duration::from_millis(50);

#[derive(Clone)]
struct Entry {
    channel: Channel,
    healthy: Arc<AtomicBool>,
    probing: Arc<AtomicBool>,
}

struct PoolInner {
    entries: Mutex<HashMap<String, Entry>>,
    timeout: Option<Duration>,
    backoff: BackoffConfig,
}

/// Shared pool of streaming channels, one per peer address.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                entries: Mutex::new(HashMap::new()),
                timeout,
                backoff: BackoffConfig::default(),
            }),
        }
    }

    /// Pre-create entries so the first request does not pay dial setup.
    pub fn warm_up<'a>(&self, addresses: impl IntoIterator<Item = &'a str>) {
        for addr in addresses {
            let _ = self.entry(addr);
        }
    }

    pub fn is_healthy(&self, address: &str) -> bool {
        let entries = self.inner.entries.lock().unwrap();
        entries
            .get(address)
            .map(|e| e.healthy.load(Ordering::Acquire))
            .unwrap_or(true)
    }

    fn entry(&self, address: &str) -> Result<Entry, tonic::Status> {
        let mut entries = self.inner.entries.lock().unwrap();
        if let Some(entry) = entries.get(address) {
            return Ok(entry.clone());
        }
        let channel = lazy_channel(address, self.inner.timeout)?;
        let entry = Entry {
            channel,
            healthy: Arc::new(AtomicBool::new(true)),
            probing: Arc::new(AtomicBool::new(false)),
        };
        entries.insert(address.to_string(), entry.clone());
        Ok(entry)
    }

    /// One RPC against one address, with health bookkeeping.
    pub async fn call(
        &self,
        address: &str,
        request: DataRequest,
    ) -> Result<DataResponse, tonic::Status> {
        let entry = self.entry(address)?;
        let mut client = JinaSingleDataRequestRpcClient::new(entry.channel.clone());
        let mut req = tonic::Request::new(request);
        if let Some(timeout) = self.inner.timeout {
            req.set_timeout(timeout);
        }
        match client.process_single_data(req).await {
            Ok(resp) => {
                entry.healthy.store(true, Ordering::Release);
                Ok(resp.into_inner())
            }
            Err(status) => {
                if is_transient(&status) {
                    self.note_failure(address, &entry);
                }
                Err(status)
            }
        }
    }

    fn note_failure(&self, address: &str, entry: &Entry) {
        entry.healthy.store(false, Ordering::Release);
        if entry.probing.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(%address, "marking connection unhealthy, probing for recovery");
        let inner = Arc::downgrade(&self.inner);
        let address = address.to_string();
        tokio::spawn(probe_until_healthy(inner, address));
    }
}

async fn probe_until_healthy(inner: Weak<PoolInner>, address: String) {
    let Some(config) = inner.upgrade().map(|i| i.backoff.clone()) else {
        return;
    };
    let mut backoff = Backoff::new(&config);
    loop {
        tokio::time::sleep(backoff.next()).await;
        let Some(pool) = inner.upgrade() else {
            return;
        };
        let mut endpoint = match Endpoint::from_shared(format!("http://{address}")) {
            Ok(ep) => ep.connect_timeout(Duration::from_secs(2)),
            Err(_) => return,
        };
        if let Some(timeout) = pool.timeout {
            endpoint = endpoint.timeout(timeout);
        }
        match endpoint.connect().await {
            Ok(channel) => {
                let mut entries = pool.entries.lock().unwrap();
                if let Some(entry) = entries.get_mut(&address) {
                    entry.channel = channel;
                    entry.healthy.store(true, Ordering::Release);
                    entry.probing.store(false, Ordering::Release);
                }
                debug!(%address, "connection recovered");
                return;
            }
            Err(err) => {
                debug!(%address, %err, "probe failed, backing off");
            }
        }
    }
}

fn lazy_channel(address: &str, timeout: Option<Duration>) -> Result<Channel, tonic::Status> {
    let mut endpoint = Endpoint::from_shared(format!("http://{address}"))
        .map_err(|e| tonic::Status::invalid_argument(format!("bad address '{address}': {e}")))?;
    if let Some(timeout) = timeout {
        // enforce the deadline client-side; the grpc-timeout header set per
        // request propagates it downstream
        endpoint = endpoint.timeout(timeout);
    }
    Ok(endpoint.connect_lazy())
}

/// Round-robin cursor over the replicas of one shard (or the head
/// addresses of one pod). The cursor is monotonically increasing modulo
/// the pool size; selection never locks.
#[derive(Debug)]
pub struct ReplicaSet {
    addresses: Vec<String>,
    cursor: AtomicUsize,
}

impl ReplicaSet {
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            addresses,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Next address in round-robin order.
    pub fn next(&self) -> &str {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.addresses.len();
        &self.addresses[index]
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }
}

/// Retry budget semantics: negative = unlimited, 0 = no retries, positive =
/// that many retries after the first attempt.
pub(crate) fn budget_allows(retries: i32, failures: usize) -> bool {
    retries < 0 || failures <= retries as usize
}

impl ConnectionPool {
    /// Dispatch to a replica set: round-robin start, skipping unhealthy
    /// replicas while any healthy one remains, retrying transient failures
    /// on the next replica until the budget runs out.
    pub async fn call_replicas(
        &self,
        replicas: &ReplicaSet,
        request: DataRequest,
        retries: i32,
    ) -> Result<DataResponse, DataPlaneError> {
        let mut failures = 0;
        self.call_replicas_counted(replicas, request, retries, &mut failures)
            .await
    }

    /// Like [`Self::call_replicas`] but drawing from an external failure
    /// counter, so one retry budget can span several replica sets (ANY
    /// polling walks shards under a single budget).
    pub async fn call_replicas_counted(
        &self,
        replicas: &ReplicaSet,
        request: DataRequest,
        retries: i32,
        failures: &mut usize,
    ) -> Result<DataResponse, DataPlaneError> {
        debug_assert!(!replicas.is_empty());
        loop {
            let address = self.pick(replicas);
            match self.call(&address, request.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(status) if is_transient(&status) => {
                    *failures += 1;
                    if !budget_allows(retries, *failures) {
                        return Err(DataPlaneError::RetriesExhausted {
                            shard: 0,
                            attempts: *failures,
                            last: status,
                        });
                    }
                    warn!(%address, %status, "transient failure, retrying on next replica");
                    if *failures % replicas.len().max(1) == 0 {
                        tokio::time::sleep(RETRY_ROUND_DELAY).await;
                    }
                }
                Err(status) => {
                    return Err(DataPlaneError::Transport {
                        address,
                        transient: false,
                        source: status,
                    })
                }
            }
        }
    }

    /// Round-robin choice preferring healthy replicas: take the next
    /// cursor position, and if it is marked unhealthy walk forward to the
    /// first healthy one (falling back to the original pick when none is).
    pub(crate) fn pick(&self, replicas: &ReplicaSet) -> String {
        let first = replicas.next().to_string();
        if self.is_healthy(&first) {
            return first;
        }
        for _ in 1..replicas.len() {
            let candidate = replicas.next().to_string();
            if self.is_healthy(&candidate) {
                return candidate;
            }
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_is_fair() {
        let set = ReplicaSet::new(vec!["a".into(), "b".into(), "c".into()]);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..20 {
            *counts.entry(set.next().to_string()).or_default() += 1;
        }
        // 20 picks over 3 replicas: fairness within one request
        let max = counts.values().max().unwrap();
        let min = counts.values().min().unwrap();
        assert!(max - min <= 1, "unfair counts: {counts:?}");
    }

    #[test]
    fn budget_semantics() {
        // unlimited
        assert!(budget_allows(-1, 1_000));
        // no retries: the first failure exhausts the budget
        assert!(!budget_allows(0, 1));
        // bounded
        assert!(budget_allows(3, 3));
        assert!(!budget_allows(3, 4));
    }

    #[tokio::test]
    async fn call_against_dead_peer_exhausts_budget() {
        let pool = ConnectionPool::new(Some(Duration::from_millis(200)));
        // nothing listens on this port
        let replicas = ReplicaSet::new(vec!["127.0.0.1:1".into()]);
        let err = pool
            .call_replicas(&replicas, DataRequest::new("/", vec![]), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DataPlaneError::RetriesExhausted { attempts: 2, .. }));
    }
}
