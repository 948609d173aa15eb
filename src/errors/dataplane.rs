// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Runtime error taxonomy for the data plane.
//!
//! The retry machinery only cares about one distinction: *transient*
//! transport failures (retried on the next replica) versus everything else
//! (surfaced as an ERROR status and carried forward through the graph).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataPlaneError {
    /// Transport-level failure talking to a peer runtime. `transient`
    /// failures count against the retry budget; others do not get retried.
    #[error("transport failure calling {address}: {source}")]
    Transport {
        address: String,
        transient: bool,
        #[source]
        source: tonic::Status,
    },

    /// The retry budget for a shard was exhausted without a usable reply.
    #[error("retries exhausted after {attempts} attempt(s) against shard {shard}: {last}")]
    RetriesExhausted {
        shard: usize,
        attempts: usize,
        last: tonic::Status,
    },

    /// A user handler failed inside a worker. Never retried.
    #[error("handler failed on endpoint '{endpoint}': {message}")]
    Handler { endpoint: String, message: String },

    /// Malformed message or an unroutable endpoint with no default handler.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The client went away; a benign shutdown cause.
    #[error("request cancelled")]
    Cancelled,
}

impl DataPlaneError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DataPlaneError::Transport { transient: true, .. })
    }
}

/// Transience classification for RPC statuses.
///
/// `Unavailable` covers refused/reset connections, `DeadlineExceeded` is
/// transient until the retry budget runs out, and `Unknown` is how tonic
/// surfaces raw transport teardown.
pub fn is_transient(status: &tonic::Status) -> bool {
    matches!(
        status.code(),
        tonic::Code::Unavailable
            | tonic::Code::DeadlineExceeded
            | tonic::Code::Cancelled
            | tonic::Code::Aborted
            | tonic::Code::Unknown
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes() {
        assert!(is_transient(&tonic::Status::unavailable("connection refused")));
        assert!(is_transient(&tonic::Status::deadline_exceeded("too slow")));
        assert!(!is_transient(&tonic::Status::invalid_argument("bad request")));
        assert!(!is_transient(&tonic::Status::internal("handler bug")));
    }

    #[test]
    fn transport_error_carries_transience() {
        let err = DataPlaneError::Transport {
            address: "127.0.0.1:9000".to_string(),
            transient: true,
            source: tonic::Status::unavailable("refused"),
        };
        assert!(err.is_transient());
        assert!(!DataPlaneError::Cancelled.is_transient());
    }
}
