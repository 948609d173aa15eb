// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Helpers on the wire types: request construction, route traces, and the
//! merge rule shared by heads (shard fan-in) and the gateway (pod fan-in).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::proto::dataplane_v1::status::StatusCode;
use crate::proto::dataplane_v1::{DataRequest, DataResponse, Document, Header, Route, Status};

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(0);

/// Process-unique request id: wall-clock nanos plus a monotonic sequence.
pub fn next_request_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{seq:x}")
}

impl Status {
    pub fn success() -> Self {
        Self {
            code: StatusCode::Success as i32,
            description: String::new(),
            exception: String::new(),
        }
    }

    pub fn error(description: impl Into<String>, exception: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error as i32,
            description: description.into(),
            exception: exception.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.code == StatusCode::Error as i32
    }

    /// Worst-of combination: ERROR > PENDING > SUCCESS. The description of
    /// the worse side wins; ties keep the left side.
    pub fn worst_of(self, other: Status) -> Status {
        if other.code > self.code {
            other
        } else {
            self
        }
    }
}

impl DataRequest {
    pub fn new(endpoint: impl Into<String>, docs: Vec<Document>) -> Self {
        Self {
            header: Some(Header {
                request_id: next_request_id(),
                exec_endpoint: endpoint.into(),
            }),
            parameters: None,
            routes: Vec::new(),
            docs,
        }
    }

    pub fn request_id(&self) -> &str {
        self.header.as_ref().map(|h| h.request_id.as_str()).unwrap_or("")
    }

    pub fn endpoint(&self) -> &str {
        self.header.as_ref().map(|h| h.exec_endpoint.as_str()).unwrap_or("")
    }

    /// Append a stage to the routing trace.
    pub fn add_route(&mut self, pod: impl Into<String>, status: Status) {
        self.routes.push(Route {
            pod: pod.into(),
            status: Some(status),
        });
    }
}

impl DataResponse {
    /// Successful response echoing the request's header, parameters, routes
    /// and documents.
    pub fn from_request(req: DataRequest) -> Self {
        Self {
            header: req.header,
            parameters: req.parameters,
            routes: req.routes,
            docs: req.docs,
            status: Some(Status::success()),
        }
    }

    /// Error response for a stage that produced no usable reply. The request
    /// documents flow forward unchanged so downstream pods can observe them.
    pub fn error_from_request(req: DataRequest, status: Status) -> Self {
        let mut resp = Self::from_request(req);
        resp.status = Some(status);
        resp
    }

    /// Re-enter the data plane: a pod's reply becomes the request for its
    /// successors. The response status survives only in the routing trace.
    pub fn into_request(self) -> DataRequest {
        DataRequest {
            header: self.header,
            parameters: self.parameters,
            routes: self.routes,
            docs: self.docs,
        }
    }

    pub fn request_id(&self) -> &str {
        self.header.as_ref().map(|h| h.request_id.as_str()).unwrap_or("")
    }

    pub fn endpoint(&self) -> &str {
        self.header.as_ref().map(|h| h.exec_endpoint.as_str()).unwrap_or("")
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
            .as_ref()
            .and_then(|s| StatusCode::try_from(s.code).ok())
            .unwrap_or(StatusCode::Success)
    }
}

/// Merge partial responses into one, in the order given by the caller
/// (shard-index order at heads, lexicographic predecessor order at the
/// gateway):
///
/// * document lists are concatenated; documents carrying the same
///   non-empty id are fan-in copies of one document and collapse to their
///   first occurrence (id-less documents are always kept),
/// * parameter maps are unioned last-writer-wins,
/// * routing traces are concatenated,
/// * the status is the worst across all parts.
///
/// Panics on an empty input; callers always hold at least one response.
pub fn merge_responses(parts: Vec<DataResponse>) -> DataResponse {
    let mut parts = parts.into_iter();
    let mut merged = parts.next().expect("merge_responses requires at least one part");
    let mut seen_ids: std::collections::HashSet<String> = merged
        .docs
        .iter()
        .filter(|d| !d.id.is_empty())
        .map(|d| d.id.clone())
        .collect();
    for part in parts {
        for doc in part.docs {
            if doc.id.is_empty() || seen_ids.insert(doc.id.clone()) {
                merged.docs.push(doc);
            }
        }
        merged.routes.extend(part.routes);
        merged.parameters = match (merged.parameters.take(), part.parameters) {
            (Some(mut a), Some(b)) => {
                a.fields.extend(b.fields);
                Some(a)
            }
            (a, b) => b.or(a),
        };
        let status = merged.status.take().unwrap_or_else(Status::success);
        merged.status = Some(status.worst_of(part.status.unwrap_or_else(Status::success)));
    }
    merged
}

/// Give every id-less document a request-scoped id so fan-out copies can
/// be recognized (and collapsed) at fan-in points.
pub fn assign_missing_doc_ids(req: &mut DataRequest) {
    let request_id = req.request_id().to_string();
    for (index, doc) in req.docs.iter_mut().enumerate() {
        if doc.id.is_empty() {
            doc.id = format!("{request_id}.{index}");
        }
    }
}
