// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Resolves `--uses` executor references into runtime instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::executor::builtins::{Identity, NameAppender, Sleeper, Tagger, TextSetter};
use crate::executor::{Executor, Parameters};

/// Build a registered executor by name.
///
/// * `uses_with` / `uses_metas` are the executor's init kwargs.
/// * `uses_requests` rebinds endpoints to handler names and always wins
///   over the executor's declared bindings.
/// * `worker_name` is made available to handlers that tag documents with
///   the identity of the serving worker.
pub fn build_executor(
    uses: &str,
    uses_with: Parameters,
    uses_metas: Parameters,
    uses_requests: HashMap<String, String>,
    worker_name: &str,
) -> Result<Executor, ConfigError> {
    let builder = match uses {
        "identity" => Executor::builder().add_default(Arc::new(Identity)),
        "tagger" => Executor::builder().add_default(Arc::new(Tagger::new(uses_with, uses_metas))),
        "name_appender" => {
            Executor::builder().add_default(Arc::new(NameAppender::new(worker_name)))
        }
        "sleeper" => {
            let delay = uses_with
                .get("delay_ms")
                .and_then(|v| v.as_u64())
                .map(Duration::from_millis)
                .unwrap_or_else(|| Duration::from_secs(1));
            Executor::builder().add_default(Arc::new(Sleeper::new(delay)))
        }
        "text_setter" => {
            let text = uses_with
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Executor::builder().add_default(Arc::new(TextSetter::new("text_setter", text)))
        }
        other => {
            return Err(ConfigError::UnknownExecutor {
                name: other.to_string(),
            })
        }
    };
    builder.with_overrides(uses_requests).build()
}
