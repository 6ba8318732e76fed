//! Pipeline driver: list file → metadata + entries → documents → sink.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::config::SinkKind;
use crate::document::{normalize_entries, Document};
use crate::entry::{block_size, body_lines, AddressEntry, CidrMode};
use crate::error::ImporterError;
use crate::metadata::extract;
use crate::sink::{create_sink, Sink};
use crate::source::{self, CommandExecutor, SelectionFilter, SystemCommandExecutor};
use crate::stats::RunStats;
use crate::utils::format_count;

/// Blocks larger than this are reported before being expanded to hosts
const LARGE_BLOCK: u128 = 65_536;

/// Documents handed to the flat sink per write
pub const WRITE_CHUNK: usize = 10_000;

/// What happened to one list file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Imported { documents: usize, rejected: usize },
    MissingMetadata,
    FilteredCategory(String),
}

/// Feeds list files through normalization into a single sink
pub struct Pipeline {
    sink: Box<dyn Sink>,
    mode: CidrMode,
    categories: SelectionFilter,
    run_started: DateTime<Utc>,
    chunk_size: usize,
    stats: RunStats,
}

impl Pipeline {
    pub fn new(
        sink: Box<dyn Sink>,
        mode: CidrMode,
        categories: SelectionFilter,
        run_started: DateTime<Utc>,
    ) -> Self {
        Self {
            sink,
            mode,
            categories,
            run_started,
            chunk_size: WRITE_CHUNK,
            stats: RunStats::default(),
        }
    }

    /// Cap on documents per `Sink::write` call.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Pipeline with the sink, CIDR mode and category filter from `config`.
    pub fn from_config(config: &Config, run_started: DateTime<Utc>) -> Result<Self> {
        let sink = create_sink(config, run_started)?;
        let categories = SelectionFilter::new(
            config.general.include_categories.iter().cloned(),
            config.general.exclude_categories.iter().cloned(),
        );
        let chunk_size = match config.sink {
            SinkKind::Csv => WRITE_CHUNK,
            SinkKind::Elasticsearch => config.elasticsearch.batch_size,
        };
        Ok(Self::new(
            sink,
            config.effective_cidr_mode(),
            categories,
            run_started,
        )
        .with_chunk_size(chunk_size))
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Run the sink's mandatory setup. Failure here is fatal.
    pub async fn prepare(&mut self) -> Result<()> {
        info!("Preparing {} sink", self.sink.name());
        self.sink
            .prepare()
            .await
            .with_context(|| format!("Failed to prepare {} sink", self.sink.name()))
    }

    /// Normalize one list file and hand its documents to the sink.
    pub async fn process(&mut self, name: &str, content: &str) -> Result<FileOutcome> {
        let metadata = match extract(content) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                self.stats.files_skipped_metadata += 1;
                return Ok(FileOutcome::MissingMetadata);
            }
        };
        if !self.categories.allows(&metadata.category) {
            info!(
                "Skipping {}: category {} is filtered out",
                name, metadata.category
            );
            self.stats.files_skipped_category += 1;
            return Ok(FileOutcome::FilteredCategory(metadata.category));
        }

        let (entries, rejected) = parse_entries(content, &metadata.set_name);
        if self.mode == CidrMode::Hosts {
            for entry in &entries {
                if let AddressEntry::Block { cidr, net } = entry {
                    let size = block_size(net);
                    if size > LARGE_BLOCK {
                        info!("{}: expanding {} into {} addresses", name, cidr, size);
                    }
                }
            }
        }
        let mut docs = normalize_entries(&metadata, &entries, self.mode, self.run_started);
        let mut documents = 0;
        loop {
            let chunk: Vec<Document> = docs.by_ref().take(self.chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            documents += chunk.len();
            self.sink.write(&chunk).await?;
        }

        self.stats.files_processed += 1;
        self.stats.entries_rejected += rejected;
        self.stats.documents += documents;

        if documents == 0 {
            debug!("{} has no entries", name);
        } else {
            debug!("{}: {} documents", name, format_count(documents));
        }

        Ok(FileOutcome::Imported {
            documents,
            rejected,
        })
    }

    /// Read and process the file at `path`; unreadable files are skipped.
    pub async fn process_file(&mut self, path: &Path) -> Result<()> {
        let content = match source::read_list(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping {:#}", e);
                self.stats.files_unreadable += 1;
                return Ok(());
            }
        };
        info!("Processing {}", path.display());
        let name = path.display().to_string();
        self.process(&name, &content).await?;
        Ok(())
    }

    /// Process `files` in order. Fatal errors stop the run; any other error
    /// only skips the file it came from.
    pub async fn process_files(&mut self, files: &[PathBuf]) -> Result<()> {
        self.stats.files_found += files.len();
        for path in files {
            if let Err(e) = self.process_file(path).await {
                match e.downcast_ref::<ImporterError>() {
                    Some(err) if !err.is_fatal() => {
                        warn!("Skipping {}: {:#}", path.display(), e);
                        self.stats.files_failed += 1;
                    }
                    _ => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// Run the sink's post-processing and return the counters.
    pub async fn finish(mut self) -> Result<RunStats> {
        self.sink
            .finish()
            .await
            .with_context(|| format!("Failed to finish {} sink", self.sink.name()))?;
        self.stats.log_summary();
        Ok(self.stats)
    }
}

/// Parse the body of a list file, logging and counting lines that are not valid entries.
fn parse_entries(content: &str, set_name: &str) -> (Vec<AddressEntry>, usize) {
    let mut rejected = 0;
    let entries = body_lines(content)
        .filter_map(|line| match AddressEntry::parse(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("{} in set {}", e, set_name);
                rejected += 1;
                None
            }
        })
        .collect();
    (entries, rejected)
}

/// Import every list file in `files` through the sink selected by `config`.
pub async fn import(
    config: &Config,
    files: &[PathBuf],
    run_started: DateTime<Utc>,
) -> Result<RunStats> {
    let mut pipeline = Pipeline::from_config(config, run_started)?;
    pipeline.prepare().await?;
    pipeline.process_files(files).await?;
    pipeline.finish().await
}

/// Full run: acquire list files, then import them.
pub async fn run(config: &Config) -> Result<RunStats> {
    run_with_executor(config, &SystemCommandExecutor).await
}

pub async fn run_with_executor(
    config: &Config,
    executor: &dyn CommandExecutor,
) -> Result<RunStats> {
    let run_started = Utc::now();
    info!("Starting import at {}", run_started.to_rfc3339());

    let files = source::acquire(&config.general, executor)?;
    import(config, &files, run_started).await
}
