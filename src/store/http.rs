//! Elasticsearch REST client built on reqwest.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{purge_query, BulkResponse, DocumentStore, ErrorResponse};
use crate::config::{ElasticsearchConfig, SecureString};
use crate::error::ImporterError;

/// HTTP client for a single Elasticsearch cluster
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: SecureString,
}

impl HttpDocumentStore {
    /// Create a client for the configured cluster
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("blocklist-importer/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.get_password(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.username {
            Some(user) => builder.basic_auth(user, Some(self.password.as_str())),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| ImporterError::Transport(e.to_string()).into())
    }

    /// HEAD `path`: 200 means present, 404 absent, anything else is an error.
    async fn exists(&self, path: &str) -> Result<bool> {
        let response = self.send(self.request(Method::HEAD, path)).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => anyhow::bail!("HEAD /{} returned {}", path, status),
        }
    }
}

/// Turn a non-2xx response into an error carrying the store's error type and reason.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(decoded) => anyhow::bail!("[{}] {}", status.as_u16(), decoded.error),
        Err(_) => anyhow::bail!("[{}] unexpected response body", status.as_u16()),
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn template_exists(&self, name: &str) -> Result<bool> {
        self.exists(&format!("_template/{}", name)).await
    }

    async fn put_template(&self, name: &str, body: Value) -> Result<()> {
        let builder = self
            .request(Method::PUT, &format!("_template/{}", name))
            .json(&body);
        check(self.send(builder).await?).await?;
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.exists(index).await
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        check(self.send(self.request(Method::PUT, index)).await?).await?;
        Ok(())
    }

    async fn bulk(&self, index: &str, body: String) -> Result<BulkResponse> {
        debug!("POST /{}/_bulk ({} bytes)", index, body.len());
        let builder = self
            .request(Method::POST, &format!("{}/_bulk", index))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let response = check(self.send(builder).await?).await?;
        response
            .json::<BulkResponse>()
            .await
            .context("Failed to decode bulk response")
    }

    async fn delete_older_than(&self, index: &str, watermark_millis: i64) -> Result<u64> {
        #[derive(Deserialize)]
        struct DeleteByQueryResponse {
            #[serde(default)]
            deleted: u64,
        }

        let builder = self
            .request(
                Method::POST,
                &format!("{}/_delete_by_query?conflicts=proceed", index),
            )
            .json(&purge_query(watermark_millis));
        let response = check(self.send(builder).await?).await?;
        let decoded: DeleteByQueryResponse = response
            .json()
            .await
            .context("Failed to decode delete-by-query response")?;
        Ok(decoded.deleted)
    }
}
