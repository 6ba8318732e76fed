//! Idempotent batched loading into a document store index.
//!
//! A run moves through `Uninitialized → TemplateChecked → IndexChecked →
//! Loading → Done`. Template and index bootstrap are best-effort: a failed
//! check is logged and loading is attempted anyway. Each batch is one bulk
//! request; a failed request only loses that batch, and per-document
//! failures inside a successful request are logged and counted.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::Sink;
use crate::config::ElasticsearchConfig;
use crate::document::Document;
use crate::store::{bulk_body, index_template, BatchIndexResult, DocumentStore};
use crate::utils::format_count;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Uninitialized,
    TemplateChecked,
    IndexChecked,
    Loading,
    Done,
}

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub index: String,
    pub template: String,
    pub batch_size: usize,
    pub purge_stale: bool,
    pub purge_delay: Duration,
    pub settle_delay: Duration,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self::from(&ElasticsearchConfig::default())
    }
}

impl From<&ElasticsearchConfig> for LoaderOptions {
    fn from(config: &ElasticsearchConfig) -> Self {
        Self {
            index: config.index.clone(),
            template: config.template.clone(),
            batch_size: config.batch_size.max(1),
            purge_stale: config.purge_stale,
            purge_delay: Duration::from_millis(config.purge_delay_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        }
    }
}

/// Counters for one run of the loader
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub documents_indexed: usize,
    pub item_failures: usize,
    pub documents_purged: u64,
}

/// Loads documents into one index through a [`DocumentStore`]
pub struct IndexLoader<S> {
    store: S,
    options: LoaderOptions,
    watermark: DateTime<Utc>,
    state: LoaderState,
    report: LoadReport,
}

impl<S: DocumentStore> IndexLoader<S> {
    /// `watermark` is the run start shared by every document of the run.
    pub fn new(store: S, options: LoaderOptions, watermark: DateTime<Utc>) -> Self {
        Self {
            store,
            options,
            watermark,
            state: LoaderState::Uninitialized,
            report: LoadReport::default(),
        }
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Ensure the template and the index exist.
    pub async fn bootstrap(&mut self) {
        self.check_template().await;
        self.state = LoaderState::TemplateChecked;
        self.check_index().await;
        self.state = LoaderState::IndexChecked;
    }

    async fn check_template(&self) {
        let name = &self.options.template;
        info!("Checking template {}", name);
        match self.store.template_exists(name).await {
            Ok(true) => debug!("Template {} already present", name),
            Ok(false) => {
                info!("Index template {} not found... Creating now", name);
                let body = index_template(&self.options.index);
                match self.store.put_template(name, body).await {
                    Ok(()) => self.settle().await,
                    Err(e) => error!("Cannot create index template {}: {:#}", name, e),
                }
            }
            Err(e) => error!("Error on check index template {}: {:#}", name, e),
        }
    }

    async fn check_index(&self) {
        let index = &self.options.index;
        match self.store.index_exists(index).await {
            Ok(true) => debug!("Index {} already present", index),
            Ok(false) => {
                info!("Index {} not found... Creating now", index);
                match self.store.create_index(index).await {
                    Ok(()) => self.settle().await,
                    Err(e) => error!("Cannot create index {}: {:#}", index, e),
                }
            }
            Err(e) => error!("Error on check index {}: {:#}", index, e),
        }
    }

    async fn settle(&self) {
        if !self.options.settle_delay.is_zero() {
            tokio::time::sleep(self.options.settle_delay).await;
        }
    }

    /// Submit `docs` in batches of at most `batch_size`.
    pub async fn load(&mut self, docs: &[Document]) {
        if self.state == LoaderState::Uninitialized {
            self.bootstrap().await;
        }
        self.state = LoaderState::Loading;

        for batch in docs.chunks(self.options.batch_size) {
            self.submit(batch).await;
        }
    }

    async fn submit(&mut self, batch: &[Document]) {
        self.report.batches_sent += 1;
        let batch_no = self.report.batches_sent;

        let body = match bulk_body(batch) {
            Ok(body) => body,
            Err(e) => {
                self.report.batches_failed += 1;
                error!("Failure encoding batch {}: {:#}", batch_no, e);
                return;
            }
        };

        debug!("Submitting batch {} ({} documents)", batch_no, batch.len());
        match self.store.bulk(&self.options.index, body).await {
            Ok(response) => {
                for result in response.results() {
                    if result.is_failure() {
                        self.report.item_failures += 1;
                        log_item_failure(result);
                    } else {
                        self.report.documents_indexed += 1;
                    }
                }
            }
            Err(e) => {
                self.report.batches_failed += 1;
                error!(
                    "Failure indexing batch {} ({} documents): {:#}",
                    batch_no,
                    batch.len(),
                    e
                );
            }
        }
    }

    /// Finish the run, purging stale documents when enabled and every batch went through.
    pub async fn complete(&mut self) {
        self.state = LoaderState::Done;

        if self.options.purge_stale {
            if self.report.batches_failed == 0 {
                self.purge().await;
            } else {
                warn!(
                    "Skipping stale document purge: {} batches failed",
                    self.report.batches_failed
                );
            }
        }

        info!(
            "Indexed {} documents in {} batches ({} failed batches, {} failed documents)",
            format_count(self.report.documents_indexed),
            self.report.batches_sent,
            self.report.batches_failed,
            format_count(self.report.item_failures)
        );
    }

    async fn purge(&mut self) {
        if !self.options.purge_delay.is_zero() {
            tokio::time::sleep(self.options.purge_delay).await;
        }
        let watermark = self.watermark.timestamp_millis();
        match self
            .store
            .delete_older_than(&self.options.index, watermark)
            .await
        {
            Ok(deleted) => {
                self.report.documents_purged = deleted;
                info!(
                    "Removed {} stale documents from {}",
                    format_count(deleted as usize),
                    self.options.index
                );
            }
            Err(e) => error!(
                "Cannot delete old documents from index {}: {:#}",
                self.options.index, e
            ),
        }
    }
}

fn log_item_failure(result: &BatchIndexResult) {
    let error = result.error.clone().unwrap_or_default();
    let cause = error.caused_by.as_deref().cloned().unwrap_or_default();
    error!(
        id = %result.id,
        status = result.status,
        error_type = %error.kind,
        reason = error.reason.as_deref().unwrap_or(""),
        cause_type = %cause.kind,
        cause_reason = cause.reason.as_deref().unwrap_or(""),
        "Document rejected"
    );
}

#[async_trait]
impl<S: DocumentStore> Sink for IndexLoader<S> {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn prepare(&mut self) -> Result<()> {
        self.bootstrap().await;
        Ok(())
    }

    async fn write(&mut self, docs: &[Document]) -> Result<()> {
        self.load(docs).await;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.complete().await;
        Ok(())
    }
}
