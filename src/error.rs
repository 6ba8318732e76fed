//! Error types for the blocklist importer.

use std::path::PathBuf;
use thiserror::Error;

use crate::metadata::MetadataField;

#[derive(Error, Debug)]
pub enum ImporterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing metadata header: {0}")]
    MetadataMissing(MetadataField),

    #[error("Invalid list entry: {0}")]
    InvalidEntry(String),

    #[error("Cannot write to {}: {source}", path.display())]
    SinkIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ImporterError {
    /// Whether the error should stop the whole run rather than the current file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImporterError::Config(_) | ImporterError::SinkIo { .. })
    }
}
