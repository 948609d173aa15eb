// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;     // topology, address tables, polling
pub mod errors;     // error handling
pub mod executor;   // endpoint table + handlers
pub mod gateway;    // graph traversal engine + transport adapters
pub mod head;       // shard/replica dispatch
pub mod net;        // connection pool + round robin
pub mod observability;
pub mod proto;      // generated protobufs live here
pub mod runtime;    // serving + readiness scaffolding
pub mod worker;     // executor hosting

#[cfg(test)]
mod integration_tests;
