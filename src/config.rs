//! Configuration management for the blocklist importer.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::document::Field;
use crate::entry::CidrMode;
use crate::error::ImporterError;
use crate::validation::{validate_delimiter, validate_index_name, validate_store_url};

/// Default environment variable holding the document store password
const PASSWORD_ENV: &str = "BLOCKLIST_IMPORTER_ES_PASSWORD";

/// Largest bulk request accepted by `elasticsearch.batch_size`
const MAX_BATCH_SIZE: usize = 10_000;

/// Secure string type that zeroizes memory on drop
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source discovery and filtering
    pub general: GeneralConfig,

    /// Active sink (csv, elasticsearch)
    pub sink: SinkKind,

    /// CIDR handling; derived from the sink when unset
    pub cidr_mode: Option<CidrMode>,

    /// Flat export and hosts aggregation
    pub csv: CsvConfig,

    /// Index loader
    pub elasticsearch: ElasticsearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            sink: SinkKind::Csv,
            cidr_mode: None,
            csv: CsvConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration file {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ImporterError> {
        let invalid = |e: anyhow::Error| ImporterError::Config(e.to_string());

        if self.general.extensions.is_empty() {
            return Err(ImporterError::Config(
                "general.extensions must list at least one file extension".into(),
            ));
        }
        if self.general.clone_repository && self.general.repository.is_empty() {
            return Err(ImporterError::Config(
                "general.repository is required when clone_repository is enabled".into(),
            ));
        }

        validate_delimiter(&self.csv.comma).map_err(invalid)?;

        if self.csv.fields.is_empty() {
            return Err(ImporterError::Config(
                "csv.fields must name at least one field".into(),
            ));
        }
        if self.csv.hosts.enabled {
            for (name, field) in [
                ("key_field", self.csv.hosts.key_field),
                ("label_field", self.csv.hosts.label_field),
            ] {
                if !self.csv.fields.contains(&field) {
                    return Err(ImporterError::Config(format!(
                        "csv.hosts.{} '{}' must be one of csv.fields",
                        name, field
                    )));
                }
            }
            if self.csv.hosts.file_name.is_empty() {
                return Err(ImporterError::Config(
                    "csv.hosts.file_name cannot be empty".into(),
                ));
            }
        }

        if self.sink == SinkKind::Elasticsearch {
            let es = &self.elasticsearch;
            validate_store_url(&es.url).map_err(invalid)?;
            validate_index_name(&es.index).map_err(invalid)?;
            validate_index_name(&es.template).map_err(invalid)?;
            if es.batch_size == 0 || es.batch_size > MAX_BATCH_SIZE {
                return Err(ImporterError::Config(format!(
                    "elasticsearch.batch_size must be between 1 and {}, got {}",
                    MAX_BATCH_SIZE, es.batch_size
                )));
            }
            if es.timeout_secs == 0 {
                return Err(ImporterError::Config(
                    "elasticsearch.timeout_secs must be positive".into(),
                ));
            }
        }

        Ok(())
    }

    /// CIDR handling for this run: explicit setting, else what suits the sink.
    pub fn effective_cidr_mode(&self) -> CidrMode {
        self.cidr_mode.unwrap_or(match self.sink {
            SinkKind::Csv => CidrMode::Hosts,
            SinkKind::Elasticsearch => CidrMode::Range,
        })
    }

    /// Generate default config with comments
    pub fn generate_default_yaml() -> String {
        include_str!("../templates/config.yaml").to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Delimited export plus hosts aggregation
    #[default]
    Csv,
    /// Bulk upserts into an Elasticsearch index
    Elasticsearch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Git repository holding the list files
    pub repository: String,
    /// Clone `repository` into `source_dir` before importing
    pub clone_repository: bool,
    /// Directory walked for list files
    pub source_dir: PathBuf,
    /// File extensions (without dot) treated as list files
    pub extensions: Vec<String>,
    /// Set names (file stems) to import; empty means all
    pub include_sets: Vec<String>,
    pub exclude_sets: Vec<String>,
    /// Categories to import; empty means all
    pub include_categories: Vec<String>,
    pub exclude_categories: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            repository: "https://github.com/firehol/blocklist-ipsets.git".to_string(),
            clone_repository: false,
            source_dir: PathBuf::from("/tmp/blocklist-ipsets"),
            extensions: vec!["ipset".to_string(), "netset".to_string()],
            include_sets: Vec::new(),
            exclude_sets: Vec::new(),
            include_categories: Vec::new(),
            exclude_categories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    /// Single-character delimiter
    pub comma: String,
    /// Column projection, in order
    pub fields: Vec<Field>,
    pub output_folder: PathBuf,
    /// Export file name; derived from the run start when unset
    pub file_name: Option<String>,
    pub hosts: HostsConfig,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            comma: ",".to_string(),
            fields: vec![
                Field::Ip,
                Field::Category,
                Field::Ipset,
                Field::Maintainer,
                Field::Version,
            ],
            output_folder: PathBuf::from("/tmp"),
            file_name: None,
            hosts: HostsConfig::default(),
        }
    }
}

impl CsvConfig {
    /// Path of this run's export file. The derived name uses local time.
    pub fn export_path(&self, run_started: DateTime<Utc>) -> PathBuf {
        let name = self.file_name.clone().unwrap_or_else(|| {
            run_started
                .with_timezone(&Local)
                .format("%d%m%Y_%H%M_firehol_ipsets.csv")
                .to_string()
        });
        self.output_folder.join(name)
    }

    /// Path of the aggregated hosts artifact.
    pub fn hosts_path(&self) -> PathBuf {
        self.output_folder.join(&self.hosts.file_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostsConfig {
    pub enabled: bool,
    pub file_name: String,
    /// Column grouped on
    pub key_field: Field,
    /// Column collected per key
    pub label_field: Field,
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file_name: "hosts.blacklist".to_string(),
            key_field: Field::Ip,
            label_field: Field::Category,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index: String,
    pub template: String,
    pub username: Option<String>,
    /// Password can be set directly or via BLOCKLIST_IMPORTER_ES_PASSWORD
    pub password: SecureString,
    /// Environment variable name to read the password from (optional)
    pub password_env: Option<String>,
    pub batch_size: usize,
    pub timeout_secs: u64,
    /// Delete documents older than the run once loading succeeded
    pub purge_stale: bool,
    pub purge_delay_ms: u64,
    /// Pause after creating the template or index
    pub settle_delay_ms: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "firehol-ipsets".to_string(),
            template: "firehol-ipset-tpl".to_string(),
            username: None,
            password: SecureString::default(),
            password_env: None,
            batch_size: 2500,
            timeout_secs: 60,
            purge_stale: false,
            purge_delay_ms: 1000,
            settle_delay_ms: 1000,
        }
    }
}

impl ElasticsearchConfig {
    /// Get the effective password, checking env vars before the config value
    pub fn get_password(&self) -> SecureString {
        if let Some(ref env_name) = self.password_env {
            if let Ok(val) = env::var(env_name) {
                return SecureString::new(val);
            }
        }
        if let Ok(val) = env::var(PASSWORD_ENV) {
            return SecureString::new(val);
        }
        self.password.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sink, SinkKind::Csv);
        assert_eq!(config.csv.comma, ",");
        assert_eq!(config.elasticsearch.batch_size, 2500);
        assert!(!config.elasticsearch.purge_stale);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_yaml_template_parses() {
        let config: Config = serde_yaml::from_str(&Config::generate_default_yaml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.extensions, vec!["ipset", "netset"]);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
sink: elasticsearch
elasticsearch:
  index: my-ipsets
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sink, SinkKind::Elasticsearch);
        assert_eq!(config.elasticsearch.index, "my-ipsets");
        assert_eq!(config.elasticsearch.url, "http://localhost:9200");
        assert_eq!(config.csv.fields.len(), 5);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "csv:\n  fields: [ip, country]\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_effective_cidr_mode() {
        let mut config = Config::default();
        assert_eq!(config.effective_cidr_mode(), CidrMode::Hosts);
        config.sink = SinkKind::Elasticsearch;
        assert_eq!(config.effective_cidr_mode(), CidrMode::Range);
        config.cidr_mode = Some(CidrMode::Hosts);
        assert_eq!(config.effective_cidr_mode(), CidrMode::Hosts);
    }

    #[test]
    fn test_validation_rejects_multi_char_comma() {
        let mut config = Config::default();
        config.csv.comma = ";;".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ImporterError::Config(_)));
        assert!(err.to_string().contains("Delimiter"));
    }

    #[test]
    fn test_validation_hosts_key_must_be_projected() {
        let mut config = Config::default();
        config.csv.fields = vec![Field::Network, Field::Category];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("key_field"));

        config.csv.hosts.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_batch_size_bounds() {
        let mut config = Config {
            sink: SinkKind::Elasticsearch,
            ..Default::default()
        };
        config.elasticsearch.batch_size = 0;
        assert!(config.validate().is_err());
        config.elasticsearch.batch_size = MAX_BATCH_SIZE + 1;
        assert!(config.validate().is_err());
        config.elasticsearch.batch_size = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_es_url_only_checked_for_es_sink() {
        let mut config = Config::default();
        config.elasticsearch.url = "not a url".to_string();
        assert!(config.validate().is_ok());
        config.sink = SinkKind::Elasticsearch;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_clone_requires_repository() {
        let mut config = Config::default();
        config.general.clone_repository = true;
        config.general.repository.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_export_path_derived_from_run_start() {
        let csv = CsvConfig::default();
        let local = Local.with_ymd_and_hms(2024, 3, 5, 7, 9, 0).unwrap();
        let started = local.with_timezone(&Utc);
        assert_eq!(
            csv.export_path(started),
            PathBuf::from("/tmp/05032024_0709_firehol_ipsets.csv")
        );
        assert_eq!(csv.hosts_path(), PathBuf::from("/tmp/hosts.blacklist"));
    }

    #[test]
    fn test_export_path_explicit_name() {
        let csv = CsvConfig {
            file_name: Some("ipsets.csv".into()),
            output_folder: PathBuf::from("/data"),
            ..Default::default()
        };
        assert_eq!(csv.export_path(Utc::now()), PathBuf::from("/data/ipsets.csv"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = Config::load("/nonexistent/blocklist-importer.yml");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_load_invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "csv:\n  comma: \"\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_secure_string_debug_redacted() {
        let config = ElasticsearchConfig {
            password: SecureString::from("hunter2"),
            ..Default::default()
        };
        let debug_str = format!("{:?}", config);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_password_from_custom_env() {
        let config = ElasticsearchConfig {
            password: SecureString::from("from-config"),
            password_env: Some("BLOCKLIST_IMPORTER_TEST_PASSWORD_ENV".into()),
            ..Default::default()
        };
        env::set_var("BLOCKLIST_IMPORTER_TEST_PASSWORD_ENV", "from-env");
        assert_eq!(config.get_password().as_str(), "from-env");
        env::remove_var("BLOCKLIST_IMPORTER_TEST_PASSWORD_ENV");
    }

    #[test]
    fn test_password_falls_back_to_config() {
        let config = ElasticsearchConfig {
            password: SecureString::from("from-config"),
            password_env: Some("BLOCKLIST_IMPORTER_TEST_UNSET_ENV".into()),
            ..Default::default()
        };
        if env::var(PASSWORD_ENV).is_err() {
            assert_eq!(config.get_password().as_str(), "from-config");
        }
    }
}
