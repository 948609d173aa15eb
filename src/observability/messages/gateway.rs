// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for request admission and graph traversal events.

use std::fmt::{Display, Formatter};

use crate::observability::messages::StructuredLog;

/// A request entered the traversal engine.
///
/// # Log Level
/// `debug!` - High-frequency data-plane event
pub struct RequestAdmitted<'a> {
    pub request_id: &'a str,
    pub endpoint: &'a str,
    pub in_flight: usize,
}

impl Display for RequestAdmitted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Admitted request {} for endpoint {} ({} in flight)",
            self.request_id, self.endpoint, self.in_flight
        )
    }
}

impl StructuredLog for RequestAdmitted<'_> {
    fn log(&self) {
        tracing::debug!(
            request_id = self.request_id,
            endpoint = self.endpoint,
            in_flight = self.in_flight,
            "{}", self
        );
    }
}

/// A pod call failed during traversal; the error status flows forward.
///
/// # Log Level
/// `warn!` - Degraded but surviving traversal
pub struct PodCallFailed<'a> {
    pub request_id: &'a str,
    pub pod: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for PodCallFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pod '{}' failed for request {}: {}",
            self.pod, self.request_id, self.error
        )
    }
}

impl StructuredLog for PodCallFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            request_id = self.request_id,
            pod = self.pod,
            error = %self.error,
            "{}", self
        );
    }
}

/// A hanging pod failed. Its output never reaches the client, so this is
/// visibility only.
///
/// # Log Level
/// `warn!` - Fire-and-forget failure, never surfaced to the client
pub struct HangingPodFailed<'a> {
    pub request_id: &'a str,
    pub pod: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for HangingPodFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Hanging pod '{}' failed for request {} (not surfaced): {}",
            self.pod, self.request_id, self.error
        )
    }
}

impl StructuredLog for HangingPodFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            request_id = self.request_id,
            pod = self.pod,
            error = %self.error,
            "{}", self
        );
    }
}

/// A client went away with requests still in flight.
///
/// # Log Level
/// `debug!` - Benign shutdown cause
pub struct ClientDisconnected {
    pub in_flight: usize,
}

impl Display for ClientDisconnected {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Client disconnected, cancelling {} in-flight request(s)",
            self.in_flight
        )
    }
}

impl StructuredLog for ClientDisconnected {
    fn log(&self) {
        tracing::debug!(in_flight = self.in_flight, "{}", self);
    }
}
