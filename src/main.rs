//! blocklist-importer: normalize IP blocklists into CSV, hosts or Elasticsearch.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use blocklist_importer::cli::Cli;
use blocklist_importer::config::Config;
use blocklist_importer::pipeline;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.default_config {
        print!("{}", Config::generate_default_yaml());
        return Ok(());
    }

    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    pipeline::run(&config).await?;
    Ok(())
}
