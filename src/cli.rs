//! CLI argument parsing with clap.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "blocklist-importer")]
#[command(author, version, about = "Normalize IP blocklists into CSV, hosts or Elasticsearch")]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.yml")]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the annotated default configuration and exit
    #[arg(long)]
    pub default_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["blocklist-importer"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.yml"));
        assert!(!cli.quiet);
        assert!(!cli.verbose);
        assert!(!cli.default_config);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::try_parse_from(["blocklist-importer", "-c", "/etc/importer.yml", "-v"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/importer.yml"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_rejects_subcommand() {
        assert!(Cli::try_parse_from(["blocklist-importer", "update"]).is_err());
    }
}
