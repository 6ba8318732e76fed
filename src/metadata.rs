//! Metadata extraction from list file comment headers.
//!
//! FireHOL list files start with a free-form comment block. Only a handful of
//! lines follow a fixed `Label : value` shape; each is located by its marker.
//! The first line matching a marker wins and later duplicates are ignored.

use std::fmt;

use crate::error::ImporterError;

/// URL fragment that carries the set name on the list's analysis link.
const IPSET_QUERY: &str = "?ipset=";

/// Metadata shared by every entry of one list file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMetadata {
    pub category: String,
    pub version: String,
    pub maintainer: String,
    pub set_name: String,
}

/// Header fields required on every list file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Category,
    Version,
    Maintainer,
    SetName,
}

impl MetadataField {
    fn label(self) -> &'static str {
        match self {
            MetadataField::Category => "Category",
            MetadataField::Version => "Version",
            MetadataField::Maintainer => "Maintainer",
            MetadataField::SetName => "ipset",
        }
    }

    /// Return the trimmed value if `line` carries this field's marker.
    fn capture(self, line: &str) -> Option<&str> {
        let text = line.strip_prefix('#').unwrap_or(line).trim_start();
        match self {
            MetadataField::SetName => capture_set_name(text),
            labelled => capture_label(text, labelled.label()),
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `Label<ws>:<value>`; the label must be followed by a colon so that
/// `Maintainer URL : ...` does not match `Maintainer`.
fn capture_label<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(label)?;
    let value = rest.trim_start().strip_prefix(':')?;
    Some(value.trim())
}

/// `http(s)://host/path?ipset=<name>`
fn capture_set_name(text: &str) -> Option<&str> {
    if !(text.starts_with("http://") || text.starts_with("https://")) {
        return None;
    }
    let start = text.find(IPSET_QUERY)? + IPSET_QUERY.len();
    Some(text[start..].trim())
}

/// Find the first line in `content` carrying `field`.
pub fn find_field(content: &str, field: MetadataField) -> Option<&str> {
    content.lines().find_map(|line| field.capture(line))
}

/// Extract the four required header fields from a list file.
///
/// Fails with [`ImporterError::MetadataMissing`] naming the first field that
/// has no matching line.
///
/// # Examples
/// ```
/// use blocklist_importer::metadata::extract;
/// let header = "# Category : spam\n# Version : 3\n# Maintainer : ops\n\
///               #  http://iplists.firehol.org/?ipset=blocklist_x\n1.2.3.4\n";
/// let meta = extract(header).unwrap();
/// assert_eq!(meta.category, "spam");
/// assert_eq!(meta.set_name, "blocklist_x");
/// ```
pub fn extract(content: &str) -> Result<ListMetadata, ImporterError> {
    let get = |field: MetadataField| {
        find_field(content, field)
            .map(str::to_string)
            .ok_or(ImporterError::MetadataMissing(field))
    };

    Ok(ListMetadata {
        category: get(MetadataField::Category)?,
        version: get(MetadataField::Version)?,
        maintainer: get(MetadataField::Maintainer)?,
        set_name: get(MetadataField::SetName)?,
    })
}
