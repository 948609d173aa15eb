// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for connection pool health events.

use std::fmt::{Display, Formatter};

use crate::observability::messages::StructuredLog;

/// All replicas of a shard were exhausted without a usable reply.
///
/// # Log Level
/// `error!` - The shard contributes an error flag to the merge
pub struct ShardExhausted<'a> {
    pub pod: &'a str,
    pub shard: usize,
    pub attempts: usize,
}

impl Display for ShardExhausted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Shard {} of pod '{}' exhausted its retry budget after {} attempt(s)",
            self.shard, self.pod, self.attempts
        )
    }
}

impl StructuredLog for ShardExhausted<'_> {
    fn log(&self) {
        tracing::error!(
            pod = self.pod,
            shard = self.shard,
            attempts = self.attempts,
            "{}", self
        );
    }
}
