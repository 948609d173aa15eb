// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors raised while parsing runtime configuration handed over on the
/// command line. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JSON in {what}: {source}")]
    BadJson {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid shard index '{key}' in connection list")]
    BadShardIndex { key: String },

    #[error("connection list has no shards")]
    EmptyConnectionList,

    #[error("shard {shard} has no replica addresses")]
    EmptyShard { shard: usize },

    #[error("invalid polling value '{value}' (expected ANY, ALL, or a JSON map)")]
    BadPolling { value: String },

    #[error("unknown executor '{name}'")]
    UnknownExecutor { name: String },

    #[error("uses_requests references unknown handler '{name}'")]
    UnknownHandler { name: String },
}
