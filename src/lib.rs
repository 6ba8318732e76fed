//! # blocklist-importer
//!
//! Ingests FireHOL-style IP blocklist files, normalizes every entry into a
//! structured document and loads the documents into one sink per run.
//!
//! ## Features
//!
//! - **Header Metadata** - Category, version, maintainer and set name read from the comment header
//! - **CIDR Handling** - Blocks expanded to every host address or kept as ranges
//! - **Flat Export** - Delimited file with a configurable column projection
//! - **Hosts Artifact** - Address to categories reduction of the flat export
//! - **Elasticsearch** - Template/index bootstrap and idempotent bulk upserts
//! - **Partial Failures** - Per-document and per-batch errors logged without aborting the run
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    blocklist-importer                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap) + Config (serde_yaml)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Source (walkdir, git)                                      │
//! │    └── list files filtered by extension and set name        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline                                                   │
//! │    ├── metadata::extract    header → ListMetadata           │
//! │    ├── entry                body → AddressEntry → Address   │
//! │    └── document::normalize  → Document                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Sink (one per run)                                         │
//! │    ├── FlatSink (csv) ──► HostsAggregator (second pass)     │
//! │    └── IndexLoader ──► DocumentStore (reqwest + rustls)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use blocklist_importer::config::Config;
//! use blocklist_importer::pipeline;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yml")?;
//!     let stats = pipeline::run(&config).await?;
//!     println!("{} documents", stats.documents);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`config`] - Configuration parsing and validation
//! - [`document`] - Normalized document and field projection
//! - [`entry`] - Body line parsing and CIDR expansion
//! - [`error`] - Error taxonomy
//! - [`metadata`] - Header metadata extraction
//! - [`pipeline`] - Run driver
//! - [`sink`] - Flat export, hosts aggregation and index loading
//! - [`source`] - Repository sync and list file discovery
//! - [`stats`] - Per-run counters
//! - [`store`] - Document store abstraction and HTTP client
//! - [`utils`] - Formatting helpers
//! - [`validation`] - Input validation for configuration values

pub mod cli;
pub mod config;
pub mod document;
pub mod entry;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stats;
pub mod store;
pub mod utils;
pub mod validation;

pub use cli::Cli;
pub use config::Config;
pub use document::Document;
pub use error::ImporterError;
