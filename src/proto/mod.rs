// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

// Module declaration for generated protobuf code
#[path = "dataplane.v1.rs"]
pub mod dataplane_v1;

pub mod convert;
mod data;

// Re-export the types for easier access
pub use data::{assign_missing_doc_ids, merge_responses, next_request_id};
pub use dataplane_v1::status::StatusCode;
pub use dataplane_v1::{DataRequest, DataResponse, Document, Header, Route, Status};
