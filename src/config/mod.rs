// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod addresses;
pub mod consts;
mod polling;
mod topology;

pub use addresses::{ConnectionList, PodAddresses};
pub use polling::{Polling, PollingMap};
pub use topology::TopologyGraph;
