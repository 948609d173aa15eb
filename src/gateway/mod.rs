// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod engine;
pub mod grpc;
pub mod http;
pub mod stream;
pub mod ws;

pub use engine::{GatewayConfig, GraphEngine};
pub use grpc::GrpcGateway;
