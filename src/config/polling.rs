// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Shard dispatch policy, resolved per request endpoint.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::consts::WILDCARD_ENDPOINT;
use crate::errors::ConfigError;

/// ANY sends a request to exactly one shard; ALL scatters it to every
/// shard and gathers the replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Polling {
    Any,
    All,
}

/// Per-endpoint polling with a wildcard default.
///
/// Accepts either a bare value (`"ANY"` / `"ALL"`) applying to all
/// endpoints, or a JSON map with endpoint keys and a `"*"` default, e.g.
/// `{"/index": "ANY", "/search": "ALL", "*": "ANY"}`.
#[derive(Debug, Clone)]
pub struct PollingMap {
    default: Polling,
    overrides: HashMap<String, Polling>,
}

impl PollingMap {
    pub fn uniform(polling: Polling) -> Self {
        Self {
            default: polling,
            overrides: HashMap::new(),
        }
    }

    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim() {
            "ANY" => return Ok(Self::uniform(Polling::Any)),
            "ALL" => return Ok(Self::uniform(Polling::All)),
            other if !other.starts_with('{') => {
                return Err(ConfigError::BadPolling {
                    value: value.to_string(),
                })
            }
            _ => {}
        }
        let mut overrides: HashMap<String, Polling> =
            serde_json::from_str(value).map_err(|_| ConfigError::BadPolling {
                value: value.to_string(),
            })?;
        let default = overrides
            .remove(WILDCARD_ENDPOINT)
            .unwrap_or(Polling::Any);
        Ok(Self { default, overrides })
    }

    pub fn resolve(&self, endpoint: &str) -> Polling {
        self.overrides.get(endpoint).copied().unwrap_or(self.default)
    }
}

impl Default for PollingMap {
    fn default() -> Self {
        Self::uniform(Polling::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_values() {
        assert_eq!(PollingMap::parse("ANY").unwrap().resolve("/index"), Polling::Any);
        assert_eq!(PollingMap::parse("ALL").unwrap().resolve("/index"), Polling::All);
    }

    #[test]
    fn parses_endpoint_map_with_wildcard() {
        let map = PollingMap::parse(r#"{"/index": "ALL", "*": "ANY"}"#).unwrap();
        assert_eq!(map.resolve("/index"), Polling::All);
        assert_eq!(map.resolve("/search"), Polling::Any);
    }

    #[test]
    fn map_without_wildcard_defaults_to_any() {
        let map = PollingMap::parse(r#"{"/search": "ALL"}"#).unwrap();
        assert_eq!(map.resolve("/search"), Polling::All);
        assert_eq!(map.resolve("/other"), Polling::Any);
    }

    #[test]
    fn rejects_garbage() {
        assert!(PollingMap::parse("SOME").is_err());
        assert!(PollingMap::parse(r#"{"/index": "SOMETIMES"}"#).is_err());
    }
}
