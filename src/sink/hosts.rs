//! Group-by-key reduction of the flat export into a hosts artifact.
//!
//! Each output line is `key<TAB>label1.label2...`, one per distinct key.
//! Labels keep the order they were first seen in; keys are emitted in the
//! order they first appeared in the export.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::CsvConfig;
use crate::document::Field;
use crate::error::ImporterError;
use crate::utils::format_count;

/// Separator between labels in the serialized record
const LABEL_SEPARATOR: &str = ".";

/// All distinct labels seen for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationRecord {
    pub key: String,
    pub values: Vec<String>,
}

impl AggregationRecord {
    pub fn joined_values(&self) -> String {
        self.values.join(LABEL_SEPARATOR)
    }
}

/// Fold `(key, label)` rows into one record per key.
///
/// The whole input is consumed before returning, so rows arriving late for
/// an already seen key still merge into it.
///
/// # Examples
/// ```
/// use blocklist_importer::sink::aggregate;
/// let records = aggregate(vec![("A", "cat1"), ("B", "cat2"), ("A", "cat1"), ("A", "cat3")]);
/// assert_eq!(records[0].values, vec!["cat1", "cat3"]);
/// assert_eq!(records[1].values, vec!["cat2"]);
/// ```
pub fn aggregate<I, K, L>(rows: I) -> Vec<AggregationRecord>
where
    I: IntoIterator<Item = (K, L)>,
    K: Into<String>,
    L: Into<String>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut records: Vec<AggregationRecord> = Vec::new();

    for (key, label) in rows {
        let key = key.into();
        let label = label.into();
        match positions.get(&key) {
            Some(&idx) => {
                let values = &mut records[idx].values;
                if !values.contains(&label) {
                    values.push(label);
                }
            }
            None => {
                positions.insert(key.clone(), records.len());
                records.push(AggregationRecord {
                    key,
                    values: vec![label],
                });
            }
        }
    }

    records
}

/// Reads the flat export back, aggregates it and appends the hosts artifact
pub struct HostsAggregator {
    path: PathBuf,
    delimiter: u8,
    key_column: usize,
    label_column: usize,
}

impl HostsAggregator {
    pub fn new(path: PathBuf, delimiter: u8, key_column: usize, label_column: usize) -> Self {
        Self {
            path,
            delimiter,
            key_column,
            label_column,
        }
    }

    /// Aggregator over the columns configured in `csv.hosts`.
    pub fn for_export(csv: &CsvConfig, delimiter: u8) -> Result<Self, ImporterError> {
        let column = |field: Field| {
            csv.fields
                .iter()
                .position(|f| *f == field)
                .ok_or_else(|| {
                    ImporterError::Config(format!("csv.fields does not contain '{}'", field))
                })
        };
        Ok(Self::new(
            csv.hosts_path(),
            delimiter,
            column(csv.hosts.key_field)?,
            column(csv.hosts.label_field)?,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the artifact for appending, creating it if needed.
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

    /// `(key, label)` pairs from the export; rows with an empty key are skipped.
    pub fn read_rows(&self, export: &Path) -> Result<Vec<(String, String)>> {
        let file = File::open(export).map_err(|source| ImporterError::SinkIo {
            path: export.to_path_buf(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for record in reader.records() {
            let record =
                record.with_context(|| format!("Failed to read {}", export.display()))?;
            match (record.get(self.key_column), record.get(self.label_column)) {
                (Some(key), Some(label)) if !key.is_empty() => {
                    rows.push((key.to_string(), label.to_string()))
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!("Skipped {} rows without a key", skipped);
        }
        Ok(rows)
    }

    /// Append one line per record.
    pub fn write(&self, records: &[AggregationRecord]) -> Result<()> {
        let file = self.open()?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(file);
        for record in records {
            writer
                .write_record([record.key.as_str(), record.joined_values().as_str()])
                .with_context(|| format!("Failed to write {}", self.path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(())
    }

    /// Aggregate `export` into the artifact, returning the number of keys written.
    pub fn run(&self, export: &Path) -> Result<usize> {
        info!("Grouping {} into {}", export.display(), self.path.display());
        let rows = self.read_rows(export)?;
        let row_count = rows.len();
        let records = aggregate(rows);
        self.write(&records)?;
        info!(
            "Grouped {} rows into {} hosts",
            format_count(row_count),
            format_count(records.len())
        );
        Ok(records.len())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn rows_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec(("[a-d]", "[w-z]"), 0..60)
    }

    proptest! {
        /// Every key appears once and no key carries a duplicate label
        #[test]
        fn prop_aggregate_unique_keys_and_labels(rows in rows_strategy()) {
            let records = aggregate(rows.clone());
            let keys: HashSet<_> = records.iter().map(|r| r.key.clone()).collect();
            prop_assert_eq!(keys.len(), records.len());
            for record in &records {
                let labels: HashSet<_> = record.values.iter().collect();
                prop_assert_eq!(labels.len(), record.values.len());
            }
        }

        /// Every input pair is represented in the output
        #[test]
        fn prop_aggregate_loses_nothing(rows in rows_strategy()) {
            let records = aggregate(rows.clone());
            for (key, label) in &rows {
                let record = records.iter().find(|r| &r.key == key).unwrap();
                prop_assert!(record.values.contains(label));
            }
        }
    }
}
