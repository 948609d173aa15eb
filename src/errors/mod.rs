// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod dataplane;
mod topology;

pub use config::ConfigError;
pub use dataplane::{is_transient, DataPlaneError};
pub use topology::TopologyError;
