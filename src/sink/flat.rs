//! Delimited flat export.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

use super::hosts::HostsAggregator;
use super::Sink;
use crate::document::{Document, Field};
use crate::error::ImporterError;
use crate::utils::format_count;

/// Appends documents as delimited rows projected onto a fixed field order
pub struct CsvExporter {
    path: PathBuf,
    delimiter: u8,
    fields: Vec<Field>,
}

impl CsvExporter {
    pub fn new(path: PathBuf, delimiter: u8, fields: Vec<Field>) -> Self {
        Self {
            path,
            delimiter,
            fields,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the export for appending, creating it if needed.
    pub fn open(&self) -> Result<File, ImporterError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| ImporterError::SinkIo {
                path: self.path.clone(),
                source,
            })
    }

    /// Project one document onto the configured fields; absent fields are empty.
    pub fn project(&self, doc: &Document) -> Vec<String> {
        self.fields
            .iter()
            .map(|field| doc.get(*field).unwrap_or_default())
            .collect()
    }

    /// Append `docs` as rows. Existing content is never rewritten.
    pub fn append(&self, docs: &[Document]) -> Result<usize> {
        let file = self.open()?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(file);

        for doc in docs {
            writer
                .write_record(self.project(doc))
                .with_context(|| format!("Failed to write row to {}", self.path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;

        Ok(docs.len())
    }
}

/// Flat export sink, with the optional hosts aggregation pass at the end
pub struct FlatSink {
    exporter: CsvExporter,
    hosts: Option<HostsAggregator>,
    rows_written: usize,
}

impl FlatSink {
    pub fn new(exporter: CsvExporter, hosts: Option<HostsAggregator>) -> Self {
        Self {
            exporter,
            hosts,
            rows_written: 0,
        }
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

#[async_trait]
impl Sink for FlatSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn prepare(&mut self) -> Result<()> {
        self.exporter.open()?;
        if let Some(hosts) = &self.hosts {
            hosts.open()?;
        }
        info!("Writing records to {}", self.exporter.path().display());
        Ok(())
    }

    async fn write(&mut self, docs: &[Document]) -> Result<()> {
        let written = self.exporter.append(docs)?;
        self.rows_written += written;
        info!("Total records: {}", format_count(written));
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        info!(
            "Export complete: {} rows in {}",
            format_count(self.rows_written),
            self.exporter.path().display()
        );
        if let Some(hosts) = &self.hosts {
            hosts.run(self.exporter.path())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::normalize;
    use crate::entry::Address;
    use crate::metadata::ListMetadata;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn doc(address: Address) -> Document {
        let meta = ListMetadata {
            category: "spam".into(),
            version: "1.0".into(),
            maintainer: "ops, inc".into(),
            set_name: "blocklist_x".into(),
        };
        normalize(&meta, address, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_project_missing_field_is_empty() {
        let exporter = CsvExporter::new(
            PathBuf::from("unused.csv"),
            b',',
            vec![Field::Ip, Field::Network, Field::Ipset],
        );
        assert_eq!(
            exporter.project(&doc(Address::Network("10.0.0.0/8".into()))),
            vec!["", "10.0.0.0/8", "blocklist_x"]
        );
        assert_eq!(
            exporter.project(&doc(Address::Host("10.0.0.1".into()))),
            vec!["10.0.0.1", "", "blocklist_x"]
        );
    }

    #[test]
    fn test_append_is_append_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let exporter = CsvExporter::new(path.clone(), b';', vec![Field::Ip, Field::Category]);

        exporter.append(&[doc(Address::Host("10.0.0.1".into()))]).unwrap();
        exporter.append(&[doc(Address::Host("10.0.0.2".into()))]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "10.0.0.1;spam\n10.0.0.2;spam\n");
    }

    #[test]
    fn test_append_quotes_values_containing_delimiter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let exporter = CsvExporter::new(path.clone(), b',', vec![Field::Ip, Field::Maintainer]);

        exporter.append(&[doc(Address::Host("10.0.0.1".into()))]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "10.0.0.1,\"ops, inc\"\n");
    }

    #[test]
    fn test_open_failure_is_sink_io() {
        let exporter = CsvExporter::new(
            PathBuf::from("/nonexistent-dir/out.csv"),
            b',',
            vec![Field::Ip],
        );
        match exporter.open() {
            Err(ImporterError::SinkIo { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent-dir/out.csv"))
            }
            other => panic!("expected SinkIo, got {:?}", other.map(|_| ())),
        }
        let err = exporter.append(&[]).unwrap_err();
        assert!(err.downcast_ref::<ImporterError>().is_some());
    }

    #[tokio::test]
    async fn test_flat_sink_without_hosts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = FlatSink::new(CsvExporter::new(path.clone(), b',', vec![Field::Ip]), None);

        sink.prepare().await.unwrap();
        assert!(path.exists());
        sink.write(&[doc(Address::Host("10.0.0.1".into()))]).await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(sink.rows_written(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "10.0.0.1\n");
    }
}
