// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in handlers reachable through `--uses`. Real deployments plug in
//! their own [`Handler`] implementations; these cover identity routing,
//! smoke tests and the wiring exercised by the integration suite.

use std::time::Duration;

use async_trait::async_trait;

use crate::executor::{Handler, Parameters};
use crate::proto::convert::json_to_prost_value;
use crate::proto::Document;

/// Returns the document list untouched.
pub struct Identity;

#[async_trait]
impl Handler for Identity {
    async fn handle(
        &self,
        docs: Vec<Document>,
        _parameters: &Parameters,
    ) -> anyhow::Result<Vec<Document>> {
        Ok(docs)
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Sets every document's text to a fixed value.
pub struct TextSetter {
    name: String,
    text: String,
}

impl TextSetter {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
impl Handler for TextSetter {
    async fn handle(
        &self,
        mut docs: Vec<Document>,
        _parameters: &Parameters,
    ) -> anyhow::Result<Vec<Document>> {
        for doc in &mut docs {
            doc.text = self.text.clone();
        }
        Ok(docs)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Writes its configuration (`uses_with` merged with `uses_metas`) into
/// every document's tags.
pub struct Tagger {
    tags: Parameters,
}

impl Tagger {
    pub fn new(mut uses_with: Parameters, uses_metas: Parameters) -> Self {
        for (key, value) in uses_metas {
            uses_with.entry(key).or_insert(value);
        }
        Self { tags: uses_with }
    }
}

#[async_trait]
impl Handler for Tagger {
    async fn handle(
        &self,
        mut docs: Vec<Document>,
        _parameters: &Parameters,
    ) -> anyhow::Result<Vec<Document>> {
        for doc in &mut docs {
            let tags = doc.tags.get_or_insert_with(Default::default);
            for (key, value) in &self.tags {
                tags.fields
                    .insert(key.clone(), json_to_prost_value(value.clone()));
            }
        }
        Ok(docs)
    }

    fn name(&self) -> &str {
        "tagger"
    }
}

/// Appends one document whose text is the hosting worker's name. Used to
/// observe which shard or replica served a request.
pub struct NameAppender {
    worker_name: String,
}

impl NameAppender {
    pub fn new(worker_name: impl Into<String>) -> Self {
        Self {
            worker_name: worker_name.into(),
        }
    }
}

#[async_trait]
impl Handler for NameAppender {
    async fn handle(
        &self,
        mut docs: Vec<Document>,
        _parameters: &Parameters,
    ) -> anyhow::Result<Vec<Document>> {
        docs.push(Document {
            text: self.worker_name.clone(),
            ..Default::default()
        });
        Ok(docs)
    }

    fn name(&self) -> &str {
        "name_appender"
    }
}

/// Sleeps when a document says "slow", returns immediately otherwise. Lets
/// tests observe that replicas of one shard process in parallel.
pub struct Sleeper {
    delay: Duration,
}

impl Sleeper {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for Sleeper {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl Handler for Sleeper {
    async fn handle(
        &self,
        docs: Vec<Document>,
        _parameters: &Parameters,
    ) -> anyhow::Result<Vec<Document>> {
        if docs.iter().any(|d| d.text == "slow") {
            tokio::time::sleep(self.delay).await;
        }
        Ok(docs)
    }

    fn name(&self) -> &str {
        "sleeper"
    }
}
