// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors detected while validating a topology graph at gateway startup.
/// All of these are fatal: a gateway never serves a graph it cannot walk.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    /// A circular data flow was detected in the pod graph.
    #[error("cyclic topology detected: {}", cycle.join(" -> "))]
    CyclicTopology { cycle: Vec<String> },

    /// A pod is referenced as a successor but never declared.
    #[error("pod '{pod}' names successor '{missing}' which is not declared in the graph")]
    UnknownSuccessor { pod: String, missing: String },

    /// A declared pod cannot be reached from start-gateway.
    #[error("pod '{pod}' is not reachable from start-gateway")]
    UnreachablePod { pod: String },

    /// The graph has no start-gateway entry.
    #[error("topology has no start-gateway node")]
    MissingStart,

    /// A pod has no address entry in the deployments table.
    #[error("pod '{pod}' has no address in the deployments table")]
    MissingAddress { pod: String },

    /// start-gateway or end-gateway appears in an illegal position.
    #[error("{node} cannot appear as {position}")]
    MisplacedSentinel { node: String, position: String },

    /// The graph description is not the expected JSON shape.
    #[error("invalid topology description: {0}")]
    Invalid(String),
}
