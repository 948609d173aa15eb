// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Address tables: pod name to head endpoints at the gateway, shard index
//! to replica endpoints at a head. Both are parsed once at startup and
//! treated as immutable for the lifetime of the runtime.

use std::collections::{BTreeMap, HashMap};

use crate::config::topology::TopologyGraph;
use crate::errors::{ConfigError, TopologyError};

/// Gateway-side table: pod name -> head addresses (`host:port`).
#[derive(Debug, Clone, Default)]
pub struct PodAddresses(HashMap<String, Vec<String>>);

impl PodAddresses {
    /// Parse e.g. `{"pod0": ["127.0.0.1:8081"], "pod1": ["127.0.0.1:8082"]}`.
    pub fn from_json(description: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, Vec<String>> =
            serde_json::from_str(description).map_err(|source| ConfigError::BadJson {
                what: "deployments addresses",
                source,
            })?;
        Ok(Self(raw))
    }

    pub fn get(&self, pod: &str) -> Option<&[String]> {
        self.0.get(pod).map(Vec::as_slice)
    }

    /// Every pod the graph names must have at least one address.
    pub fn validate_against(&self, graph: &TopologyGraph) -> Result<(), TopologyError> {
        for pod in graph.pods() {
            match self.0.get(pod) {
                Some(addrs) if !addrs.is_empty() => {}
                _ => {
                    return Err(TopologyError::MissingAddress { pod: pod.clone() });
                }
            }
        }
        Ok(())
    }
}

impl From<HashMap<String, Vec<String>>> for PodAddresses {
    fn from(map: HashMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}

/// Head-side table: shard index -> replica addresses. Kept in a `BTreeMap`
/// so shard iteration order is the merge order.
#[derive(Debug, Clone)]
pub struct ConnectionList(BTreeMap<usize, Vec<String>>);

impl ConnectionList {
    /// Parse e.g. `{"0": ["127.0.0.1:9000", "127.0.0.1:9001"], "1": [...]}`.
    pub fn from_json(description: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, Vec<String>> =
            serde_json::from_str(description).map_err(|source| ConfigError::BadJson {
                what: "connection list",
                source,
            })?;
        let mut shards = BTreeMap::new();
        for (key, replicas) in raw {
            let index: usize = key
                .parse()
                .map_err(|_| ConfigError::BadShardIndex { key: key.clone() })?;
            shards.insert(index, replicas);
        }
        Self::from_shards(shards)
    }

    pub fn from_shards(shards: BTreeMap<usize, Vec<String>>) -> Result<Self, ConfigError> {
        if shards.is_empty() {
            return Err(ConfigError::EmptyConnectionList);
        }
        for (&shard, replicas) in &shards {
            if replicas.is_empty() {
                return Err(ConfigError::EmptyShard { shard });
            }
        }
        Ok(Self(shards))
    }

    pub fn shard_count(&self) -> usize {
        self.0.len()
    }

    /// Shard indexes in ascending order.
    pub fn shards(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.keys().copied()
    }

    pub fn replicas(&self, shard: usize) -> &[String] {
        self.0.get(&shard).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All replica addresses across shards, for pool warm-up.
    pub fn all_addresses(&self) -> impl Iterator<Item = &str> {
        self.0.values().flatten().map(String::as_str)
    }
}
