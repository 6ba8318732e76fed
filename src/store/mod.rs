//! Document store abstraction (Elasticsearch wire contract).

mod http;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;

#[cfg(test)]
use mockall::automock;

pub use http::HttpDocumentStore;

use crate::document::Document;

/// Highest per-item status treated as a successful upsert (200 updated, 201 created)
pub const SUCCESS_THRESHOLD: u16 = 201;

/// Operations the index loader needs from a document store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `true` on 200, `false` on 404, error otherwise
    async fn template_exists(&self, name: &str) -> Result<bool>;

    async fn put_template(&self, name: &str, body: Value) -> Result<()>;

    /// `true` on 200, `false` on 404, error otherwise
    async fn index_exists(&self, index: &str) -> Result<bool>;

    async fn create_index(&self, index: &str) -> Result<()>;

    /// Submit one NDJSON bulk body. An error means the whole batch failed.
    async fn bulk(&self, index: &str, body: String) -> Result<BulkResponse>;

    /// Delete documents whose timestamp is older than `watermark_millis`,
    /// returning how many were removed.
    async fn delete_older_than(&self, index: &str, watermark_millis: i64) -> Result<u64>;
}

/// Body of a bulk response
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    pub fn results(&self) -> impl Iterator<Item = &BatchIndexResult> {
        self.items.iter().map(|item| &item.index)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BulkItem {
    pub index: BatchIndexResult,
}

/// Outcome for one document of a bulk request
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BatchIndexResult {
    #[serde(rename = "_id", default)]
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<StoreError>,
}

impl BatchIndexResult {
    pub fn is_failure(&self) -> bool {
        self.status > SUCCESS_THRESHOLD
    }
}

/// Structured error reported by the store, with its nested cause
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StoreError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub caused_by: Option<Box<StoreError>>,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason.as_deref().unwrap_or(""))?;
        if let Some(cause) = &self.caused_by {
            write!(f, " (caused by {})", cause)?;
        }
        Ok(())
    }
}

/// Top-level error body returned with a non-2xx status
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: StoreError,
    #[serde(default)]
    pub status: Option<u16>,
}

/// Index template for `index_pattern`.
pub fn index_template(index_pattern: &str) -> Value {
    json!({
        "order": 0,
        "index_patterns": [index_pattern],
        "settings": {
            "index": {
                "codec": "best_compression"
            }
        },
        "mappings": {
            "properties": {
                "ip": { "type": "ip" },
                "network": { "type": "ip_range" },
                "category": { "type": "keyword" },
                "maintainer": { "type": "text" },
                "ipset": { "type": "keyword" },
                "version": { "type": "text" },
                "timestamp": {
                    "type": "date",
                    "format": "epoch_millis||epoch_second||date_time||MMM dd YYYY HH:mm:ss z||MMM dd yyyy HH:mm:ss"
                }
            }
        }
    })
}

/// NDJSON bulk body: one `index` action line with the document id, then the document.
pub fn bulk_body(docs: &[Document]) -> Result<String> {
    let mut body = String::new();
    for doc in docs {
        let id = doc.id();
        let action = json!({ "index": { "_id": id } });
        let source = serde_json::to_string(doc)
            .with_context(|| format!("Cannot encode document {}", id))?;
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&source);
        body.push('\n');
    }
    Ok(body)
}

/// Body of the stale-document purge request.
pub fn purge_query(watermark_millis: i64) -> Value {
    json!({
        "query": {
            "range": {
                "timestamp": { "lt": watermark_millis }
            }
        }
    })
}
