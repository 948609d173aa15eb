// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod gateway;
pub mod net;

/// Messages that can be emitted as structured log events.
pub trait StructuredLog {
    /// Emit a log event with structured fields.
    ///
    /// This logs both:
    /// - Human-readable message (via `Display` trait)
    /// - Machine-readable fields for querying and metrics
    ///
    /// The appropriate log level (info, warn, error) is determined by the
    /// message type's semantic meaning.
    fn log(&self);
}
