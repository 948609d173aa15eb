// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backoff;
mod pool;

pub use pool::{ConnectionPool, ReplicaSet};

pub(crate) use pool::budget_allows;
