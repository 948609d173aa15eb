// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structured logging message types for the data plane.
//!
//! Message types pair a `Display` implementation (human-readable line) with
//! a `StructuredLog` implementation (machine-readable fields), so call
//! sites never format ad-hoc strings.
//!
//! Messages are organized by subsystem:
//! * `messages::gateway` - request admission and graph traversal events
//! * `messages::net` - connection pool health events

pub mod messages;

pub use messages::StructuredLog;
