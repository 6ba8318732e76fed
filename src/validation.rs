//! Validation helpers for configuration values.
//!
//! - Delimiters for the flat export
//! - Document store URLs
//! - Index and template names

use anyhow::{bail, Result};

/// Validate a flat export delimiter and return it as a single byte.
///
/// # Examples
/// ```
/// use blocklist_importer::validation::validate_delimiter;
/// assert_eq!(validate_delimiter(",").unwrap(), b',');
/// assert_eq!(validate_delimiter("\t").unwrap(), b'\t');
/// assert!(validate_delimiter(",;").is_err());
/// assert!(validate_delimiter("\"").is_err());
/// ```
pub fn validate_delimiter(comma: &str) -> Result<u8> {
    let bytes = comma.as_bytes();
    if bytes.len() != 1 {
        bail!(
            "Delimiter must be a single ASCII character, got {:?}",
            comma
        );
    }
    let delimiter = bytes[0];
    if matches!(delimiter, b'"' | b'\n' | b'\r') {
        bail!("Delimiter {:?} cannot be used in delimited output", comma);
    }
    Ok(delimiter)
}

/// Validate a document store base URL (http or https, no trailing path games).
///
/// # Examples
/// ```
/// use blocklist_importer::validation::validate_store_url;
/// assert!(validate_store_url("http://localhost:9200").is_ok());
/// assert!(validate_store_url("https://es.example.com").is_ok());
/// assert!(validate_store_url("ftp://es.example.com").is_err());
/// ```
pub fn validate_store_url(url: &str) -> Result<()> {
    let Some(rest) = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
    else {
        bail!("Document store URL must use http or https: {}", url);
    };
    if rest.is_empty() || rest.starts_with('/') {
        bail!("Document store URL has no host: {}", url);
    }
    if url.chars().any(|c| c.is_whitespace()) {
        bail!("Document store URL contains whitespace: {:?}", url);
    }
    Ok(())
}

/// Validate an index or template name.
///
/// Elasticsearch names must be lowercase, must not start with `-`, `_` or `+`,
/// and cannot contain path or wildcard characters.
///
/// # Examples
/// ```
/// use blocklist_importer::validation::validate_index_name;
/// assert!(validate_index_name("firehol-ipsets").is_ok());
/// assert!(validate_index_name("Firehol").is_err());
/// assert!(validate_index_name("_hidden").is_err());
/// ```
pub fn validate_index_name(name: &str) -> Result<()> {
    const FORBIDDEN: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':'];

    if name.is_empty() || name.len() > 255 {
        bail!("Index name must be 1-255 characters: {:?}", name);
    }
    if name == "." || name == ".." {
        bail!("Index name cannot be {:?}", name);
    }
    if name.starts_with(['-', '_', '+']) {
        bail!("Index name cannot start with '-', '_' or '+': {}", name);
    }
    if name.chars().any(|c| c.is_uppercase() || FORBIDDEN.contains(&c)) {
        bail!(
            "Index name must be lowercase without path or wildcard characters: {}",
            name
        );
    }
    Ok(())
}
