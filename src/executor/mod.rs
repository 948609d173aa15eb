// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Executor plug-in model hosted by workers.
//!
//! An [`Executor`] is an endpoint table: request endpoint -> [`Handler`].
//! Handlers declare their bindings at registration time (an explicit list
//! of endpoints, or the role of default handler serving `/default` and any
//! otherwise-unbound endpoint). Launch arguments may override bindings
//! (`uses_requests`), and overrides always win over declarations.

mod builtins;
mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::consts::DEFAULT_ENDPOINT;
use crate::errors::ConfigError;
use crate::proto::Document;

pub use builtins::{Identity, NameAppender, Sleeper, Tagger, TextSetter};
pub use registry::build_executor;

/// Parameter maps as handlers see them (the wire `Struct` converted to
/// plain JSON).
pub type Parameters = serde_json::Map<String, Value>;

/// A single request handler inside an executor.
///
/// Handlers own the document list for the duration of a call and hand back
/// the (possibly replaced) list. Failures are caught by the worker and
/// translated into an ERROR status; they never tear down the runtime.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        docs: Vec<Document>,
        parameters: &Parameters,
    ) -> anyhow::Result<Vec<Document>>;

    fn name(&self) -> &str;
}

/// Declared binding for one handler.
enum Binding {
    /// Serves `/default` and every endpoint with no explicit binding.
    Default,
    /// Serves exactly the listed endpoints.
    On(Vec<String>),
}

/// Builder collecting handler declarations and launch-time overrides.
pub struct ExecutorBuilder {
    handlers: Vec<(Arc<dyn Handler>, Binding)>,
    overrides: HashMap<String, String>,
}

impl ExecutorBuilder {
    /// Register the default handler.
    pub fn add_default(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push((handler, Binding::Default));
        self
    }

    /// Register a handler for an explicit list of endpoints.
    pub fn add_on<I, S>(mut self, handler: Arc<dyn Handler>, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints = endpoints.into_iter().map(Into::into).collect();
        self.handlers.push((handler, Binding::On(endpoints)));
        self
    }

    /// Register a handler reachable only through `uses_requests` overrides.
    pub fn add_unbound(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push((handler, Binding::On(Vec::new())));
        self
    }

    /// Apply launch-argument overrides: endpoint -> handler name. These take
    /// precedence over declared bindings; overriding `/default` rebinds the
    /// default handler itself.
    pub fn with_overrides(mut self, uses_requests: HashMap<String, String>) -> Self {
        self.overrides.extend(uses_requests);
        self
    }

    pub fn build(self) -> Result<Executor, ConfigError> {
        let mut endpoints: HashMap<String, Arc<dyn Handler>> = HashMap::new();
        let mut by_name: HashMap<String, Arc<dyn Handler>> = HashMap::new();

        for (handler, binding) in self.handlers {
            by_name.insert(handler.name().to_string(), Arc::clone(&handler));
            match binding {
                Binding::Default => {
                    endpoints.insert(DEFAULT_ENDPOINT.to_string(), handler);
                }
                Binding::On(eps) => {
                    for ep in eps {
                        endpoints.insert(ep, Arc::clone(&handler));
                    }
                }
            }
        }

        for (endpoint, handler_name) in self.overrides {
            let handler = by_name
                .get(&handler_name)
                .cloned()
                .ok_or(ConfigError::UnknownHandler { name: handler_name })?;
            endpoints.insert(endpoint, handler);
        }

        Ok(Executor { endpoints })
    }
}

/// Immutable endpoint table. Constructed once at worker startup.
pub struct Executor {
    endpoints: HashMap<String, Arc<dyn Handler>>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Executor {
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder {
            handlers: Vec::new(),
            overrides: HashMap::new(),
        }
    }

    /// Select the handler for an endpoint: exact binding first, then the
    /// default handler, then nothing (the request passes through unchanged).
    pub fn resolve(&self, endpoint: &str) -> Option<&Arc<dyn Handler>> {
        self.endpoints
            .get(endpoint)
            .or_else(|| self.endpoints.get(DEFAULT_ENDPOINT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setter(name: &str, text: &str) -> Arc<dyn Handler> {
        Arc::new(TextSetter::new(name, text))
    }

    async fn run(executor: &Executor, endpoint: &str) -> Option<String> {
        let handler = executor.resolve(endpoint)?;
        let docs = handler
            .handle(vec![Document::default()], &Parameters::new())
            .await
            .unwrap();
        Some(docs[0].text.clone())
    }

    #[tokio::test]
    async fn default_handler_serves_unbound_endpoints() {
        let executor = Executor::builder()
            .add_default(setter("foo", "foo"))
            .add_on(setter("foobar", "foobar"), ["/1", "/2"])
            .build()
            .unwrap();

        assert_eq!(run(&executor, "/index").await.unwrap(), "foo");
        assert_eq!(run(&executor, "/1").await.unwrap(), "foobar");
        assert_eq!(run(&executor, "/2").await.unwrap(), "foobar");
    }

    #[tokio::test]
    async fn overrides_rebind_endpoints() {
        let executor = Executor::builder()
            .add_default(setter("foo", "foo"))
            .add_unbound(setter("bar", "bar"))
            .add_on(setter("foobar", "foobar"), ["/1", "/2"])
            .with_overrides(HashMap::from([("/index".to_string(), "bar".to_string())]))
            .build()
            .unwrap();

        assert_eq!(run(&executor, "/index").await.unwrap(), "bar");
        assert_eq!(run(&executor, "/1").await.unwrap(), "foobar");
        // endpoints with no binding still fall back to the default
        assert_eq!(run(&executor, "/index-blah").await.unwrap(), "foo");
    }

    #[tokio::test]
    async fn overriding_default_rebinds_it() {
        let executor = Executor::builder()
            .add_default(setter("foo", "foo"))
            .add_unbound(setter("bar", "bar"))
            .with_overrides(HashMap::from([("/default".to_string(), "bar".to_string())]))
            .build()
            .unwrap();

        assert_eq!(run(&executor, "/index").await.unwrap(), "bar");
    }

    #[tokio::test]
    async fn no_handler_resolves_to_none() {
        let executor = Executor::builder()
            .add_on(setter("foobar", "foobar"), ["/1"])
            .build()
            .unwrap();
        assert!(executor.resolve("/unbound").is_none());
    }

    #[test]
    fn unknown_override_target_is_fatal() {
        let err = Executor::builder()
            .add_default(setter("foo", "foo"))
            .with_overrides(HashMap::from([("/index".to_string(), "ghost".to_string())]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownHandler { .. }));
    }
}
