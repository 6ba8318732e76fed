//! Output sinks for normalized documents.
//!
//! Exactly one sink is active per run. The pipeline calls [`Sink::prepare`]
//! once, [`Sink::write`] once per list file, then [`Sink::finish`].

mod flat;
mod hosts;
mod index;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use flat::{CsvExporter, FlatSink};
pub use hosts::{aggregate, AggregationRecord, HostsAggregator};
pub use index::{IndexLoader, LoadReport, LoaderOptions, LoaderState};

use crate::config::{Config, SinkKind};
use crate::document::Document;
use crate::error::ImporterError;
use crate::store::HttpDocumentStore;
use crate::validation::validate_delimiter;

/// Destination for normalized documents
#[async_trait]
pub trait Sink: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Mandatory setup (open output files, bootstrap the index)
    async fn prepare(&mut self) -> Result<()>;

    /// Accept the documents of one list file
    async fn write(&mut self, docs: &[Document]) -> Result<()>;

    /// Post-processing once every file has been written
    async fn finish(&mut self) -> Result<()>;
}

/// Create the sink selected by configuration
pub fn create_sink(config: &Config, run_started: DateTime<Utc>) -> Result<Box<dyn Sink>> {
    match config.sink {
        SinkKind::Csv => {
            let csv = &config.csv;
            let delimiter =
                validate_delimiter(&csv.comma).map_err(|e| ImporterError::Config(e.to_string()))?;
            let exporter =
                CsvExporter::new(csv.export_path(run_started), delimiter, csv.fields.clone());
            let hosts = if csv.hosts.enabled {
                Some(HostsAggregator::for_export(csv, delimiter)?)
            } else {
                None
            };
            Ok(Box::new(FlatSink::new(exporter, hosts)))
        }
        SinkKind::Elasticsearch => {
            let es = &config.elasticsearch;
            let store = HttpDocumentStore::new(es)?;
            Ok(Box::new(IndexLoader::new(
                store,
                LoaderOptions::from(es),
                run_started,
            )))
        }
    }
}
