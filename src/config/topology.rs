// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Topology graph validation and traversal planning.
//!
//! A topology is a directed acyclic graph of pod names with two sentinel
//! nodes: `start-gateway` (sole source) and `end-gateway` (sole sink). The
//! gateway walks this graph once per request, so the graph is validated
//! exhaustively at startup and then treated as immutable.
//!
//! Validation pipeline:
//!
//! 1. **Shape**: the description is a JSON object `pod -> [successors]`
//!    with a `start-gateway` entry; `end-gateway` never declares successors.
//! 2. **Reference**: every successor is either a declared pod or
//!    `end-gateway`.
//! 3. **Cycle detection**: Kahn's algorithm over the pod-only subgraph.
//! 4. **Reachability**: every declared pod is reachable from
//!    `start-gateway`. Pods that reach no successor at all are *hanging*
//!    (fire-and-forget), which is legal and flagged, not rejected.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::consts::{END_GATEWAY, START_GATEWAY};
use crate::errors::TopologyError;

/// Immutable adjacency view of a topology, keyed by pod name.
///
/// Predecessor lists are pre-computed and kept sorted so fan-in merges are
/// deterministic (lexicographic predecessor order).
#[derive(Debug, Clone)]
pub struct TopologyGraph {
    successors: HashMap<String, Vec<String>>,
    predecessors: HashMap<String, Vec<String>>,
    pods: Vec<String>,
    roots: Vec<String>,
}

impl TopologyGraph {
    /// Parse and validate a JSON graph description, e.g.
    /// `{"start-gateway": ["pod0"], "pod0": ["end-gateway"]}`.
    pub fn from_json(description: &str) -> Result<Self, TopologyError> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(description)
            .map_err(|e| TopologyError::Invalid(e.to_string()))?;
        Self::from_adjacency(raw)
    }

    pub fn from_adjacency(mut raw: HashMap<String, Vec<String>>) -> Result<Self, TopologyError> {
        let roots = raw.remove(START_GATEWAY).ok_or(TopologyError::MissingStart)?;
        if raw.contains_key(END_GATEWAY) {
            return Err(TopologyError::MisplacedSentinel {
                node: END_GATEWAY.to_string(),
                position: "a graph key".to_string(),
            });
        }

        let mut pods: Vec<String> = raw.keys().cloned().collect();
        pods.sort();

        // Roots must be declared pods too.
        for root in &roots {
            if root == START_GATEWAY || root == END_GATEWAY {
                return Err(TopologyError::MisplacedSentinel {
                    node: root.clone(),
                    position: "a successor of start-gateway".to_string(),
                });
            }
            if !raw.contains_key(root) {
                return Err(TopologyError::UnknownSuccessor {
                    pod: START_GATEWAY.to_string(),
                    missing: root.clone(),
                });
            }
        }

        let mut predecessors: HashMap<String, Vec<String>> =
            pods.iter().map(|p| (p.clone(), Vec::new())).collect();
        for (pod, succs) in &raw {
            for succ in succs {
                if succ == START_GATEWAY {
                    return Err(TopologyError::MisplacedSentinel {
                        node: START_GATEWAY.to_string(),
                        position: "a successor".to_string(),
                    });
                }
                if succ == END_GATEWAY {
                    continue;
                }
                match predecessors.get_mut(succ) {
                    Some(preds) => preds.push(pod.clone()),
                    None => {
                        return Err(TopologyError::UnknownSuccessor {
                            pod: pod.clone(),
                            missing: succ.clone(),
                        })
                    }
                }
            }
        }
        for preds in predecessors.values_mut() {
            preds.sort();
        }

        let graph = Self {
            successors: raw,
            predecessors,
            pods,
            roots,
        };
        graph.detect_cycles()?;
        graph.check_reachability()?;
        Ok(graph)
    }

    /// Pod names in sorted order, sentinels excluded.
    pub fn pods(&self) -> &[String] {
        &self.pods
    }

    /// Successors of start-gateway: the pods that receive the raw request.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Successors of a pod, possibly including `end-gateway`.
    pub fn successors(&self, pod: &str) -> &[String] {
        self.successors.get(pod).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Predecessor pods of `pod`, sorted lexicographically. Roots have none.
    pub fn predecessors(&self, pod: &str) -> &[String] {
        self.predecessors.get(pod).map(Vec::as_slice).unwrap_or(&[])
    }

    /// How many requests feed this pod: graph predecessors plus one raw
    /// request from the gateway if the pod is a root.
    pub fn fan_in(&self, pod: &str) -> usize {
        let from_start = self.roots.iter().filter(|r| r.as_str() == pod).count();
        self.predecessors(pod).len() + from_start
    }

    /// A hanging pod has no successors at all: it is invoked fire-and-forget
    /// and its output never reaches the client.
    pub fn is_hanging(&self, pod: &str) -> bool {
        self.successors(pod).is_empty()
    }

    /// Whether one of this pod's successors is `end-gateway`.
    pub fn feeds_end(&self, pod: &str) -> bool {
        self.successors(pod).iter().any(|s| s == END_GATEWAY)
    }

    /// Number of responses the client sees per request: one per edge into
    /// `end-gateway`.
    pub fn end_fan_in(&self) -> usize {
        self.pods.iter().filter(|p| self.feeds_end(p)).count()
    }

    fn detect_cycles(&self) -> Result<(), TopologyError> {
        let mut in_degree: HashMap<&str, usize> =
            self.pods.iter().map(|p| (p.as_str(), 0)).collect();
        for pod in &self.pods {
            for succ in self.successors(pod) {
                if succ != END_GATEWAY {
                    *in_degree.get_mut(succ.as_str()).unwrap() += 1;
                }
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter_map(|(pod, &deg)| (deg == 0).then_some(*pod))
            .collect();
        let mut processed = 0;
        while let Some(pod) = queue.pop_front() {
            processed += 1;
            for succ in self.successors(pod) {
                if succ == END_GATEWAY {
                    continue;
                }
                let deg = in_degree.get_mut(succ.as_str()).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(succ.as_str());
                }
            }
        }

        if processed < self.pods.len() {
            let mut cycle: Vec<String> = in_degree
                .into_iter()
                .filter_map(|(pod, deg)| (deg > 0).then(|| pod.to_string()))
                .collect();
            cycle.sort();
            return Err(TopologyError::CyclicTopology { cycle });
        }
        Ok(())
    }

    fn check_reachability(&self) -> Result<(), TopologyError> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = self.roots.iter().map(String::as_str).collect();
        while let Some(pod) = queue.pop_front() {
            if !seen.insert(pod) {
                continue;
            }
            for succ in self.successors(pod) {
                if succ != END_GATEWAY {
                    queue.push_back(succ.as_str());
                }
            }
        }
        for pod in &self.pods {
            if !seen.contains(pod.as_str()) {
                return Err(TopologyError::UnreachablePod { pod: pod.clone() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(description: &str) -> TopologyGraph {
        TopologyGraph::from_json(description).unwrap()
    }

    #[test]
    fn parses_trivial_topology() {
        let g = graph(r#"{"start-gateway": ["pod0"], "pod0": ["end-gateway"]}"#);
        assert_eq!(g.roots(), ["pod0"]);
        assert_eq!(g.pods(), ["pod0"]);
        assert!(g.feeds_end("pod0"));
        assert_eq!(g.end_fan_in(), 1);
        assert_eq!(g.fan_in("pod0"), 1);
    }

    #[test]
    fn branching_and_merging_topology() {
        let g = graph(
            r#"{
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
            }"#,
        );
        assert_eq!(g.predecessors("merger"), ["pod3", "pod5"]);
        assert_eq!(g.fan_in("merger"), 2);
        assert!(g.is_hanging("pod6"));
        assert!(g.is_hanging("pod1"));
        assert!(!g.is_hanging("pod0"));
        assert_eq!(g.end_fan_in(), 1);
    }

    #[test]
    fn rejects_cycles() {
        let err = TopologyGraph::from_json(
            r#"{"start-gateway": ["a"], "a": ["b"], "b": ["c"], "c": ["a"]}"#,
        )
        .unwrap_err();
        match err {
            TopologyError::CyclicTopology { cycle } => {
                assert_eq!(cycle, vec!["a", "b", "c"]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_successor() {
        let err = TopologyGraph::from_json(
            r#"{"start-gateway": ["a"], "a": ["ghost"]}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TopologyError::UnknownSuccessor {
                pod: "a".to_string(),
                missing: "ghost".to_string(),
            }
        );
    }

    #[test]
    fn rejects_unreachable_pod() {
        let err = TopologyGraph::from_json(
            r#"{"start-gateway": ["a"], "a": ["end-gateway"], "island": ["end-gateway"]}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TopologyError::UnreachablePod {
                pod: "island".to_string(),
            }
        );
    }

    #[test]
    fn rejects_missing_start() {
        let err = TopologyGraph::from_json(r#"{"a": ["end-gateway"]}"#).unwrap_err();
        assert_eq!(err, TopologyError::MissingStart);
    }

    #[test]
    fn rejects_end_gateway_as_key() {
        let err = TopologyGraph::from_json(
            r#"{"start-gateway": ["a"], "a": ["end-gateway"], "end-gateway": []}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::MisplacedSentinel { .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = TopologyGraph::from_json("not json").unwrap_err();
        assert!(matches!(err, TopologyError::Invalid(_)));
    }
}
