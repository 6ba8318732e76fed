//! Canonical document record and the normalizer that builds it.

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use std::fmt;

use crate::entry::{Address, AddressEntry, CidrMode};
use crate::metadata::ListMetadata;

/// A normalized blocklist entry, ready for any sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub address: Address,
    pub category: String,
    pub maintainer: String,
    pub ipset: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Projectable document fields, named as they appear in exports and the index
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Ip,
    Network,
    Category,
    Maintainer,
    Ipset,
    Version,
    Timestamp,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Ip => "ip",
            Field::Network => "network",
            Field::Category => "category",
            Field::Maintainer => "maintainer",
            Field::Ipset => "ipset",
            Field::Version => "version",
            Field::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Document {
    /// Stable identifier: `<ipset>_<address>`, prefix length stripped for networks.
    ///
    /// Reloading the same list produces the same ids, so the index overwrites
    /// documents instead of duplicating them.
    pub fn id(&self) -> String {
        format!("{}_{}", self.ipset, self.address.key())
    }

    /// Value of `field`, `None` for the address variant this document doesn't carry.
    pub fn get(&self, field: Field) -> Option<String> {
        match (field, &self.address) {
            (Field::Ip, Address::Host(ip)) => Some(ip.clone()),
            (Field::Network, Address::Network(cidr)) => Some(cidr.clone()),
            (Field::Ip, _) | (Field::Network, _) => None,
            (Field::Category, _) => Some(self.category.clone()),
            (Field::Maintainer, _) => Some(self.maintainer.clone()),
            (Field::Ipset, _) => Some(self.ipset.clone()),
            (Field::Version, _) => Some(self.version.clone()),
            (Field::Timestamp, _) => Some(self.timestamp.timestamp_millis().to_string()),
        }
    }
}

// The index maps `timestamp` with an epoch_millis format, and exactly one of
// `ip` / `network` is written.
impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(6))?;
        match &self.address {
            Address::Host(ip) => map.serialize_entry(Field::Ip.as_str(), ip)?,
            Address::Network(cidr) => map.serialize_entry(Field::Network.as_str(), cidr)?,
        }
        map.serialize_entry(Field::Category.as_str(), &self.category)?;
        map.serialize_entry(Field::Maintainer.as_str(), &self.maintainer)?;
        map.serialize_entry(Field::Ipset.as_str(), &self.ipset)?;
        map.serialize_entry(Field::Version.as_str(), &self.version)?;
        map.serialize_entry(Field::Timestamp.as_str(), &self.timestamp.timestamp_millis())?;
        map.end()
    }
}

/// Build the document for one address of a list file.
pub fn normalize(metadata: &ListMetadata, address: Address, timestamp: DateTime<Utc>) -> Document {
    Document {
        address,
        category: metadata.category.clone(),
        maintainer: metadata.maintainer.clone(),
        ipset: metadata.set_name.clone(),
        version: metadata.version.clone(),
        timestamp,
    }
}

/// Normalize every address produced by `entries`, preserving order.
pub fn normalize_entries<'a>(
    metadata: &'a ListMetadata,
    entries: &'a [AddressEntry],
    mode: CidrMode,
    timestamp: DateTime<Utc>,
) -> impl Iterator<Item = Document> + 'a {
    entries
        .iter()
        .flat_map(move |entry| entry.addresses(mode))
        .map(move |address| normalize(metadata, address, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metadata() -> ListMetadata {
        ListMetadata {
            category: "spam".into(),
            version: "1.0".into(),
            maintainer: "ops".into(),
            set_name: "blocklist_x".into(),
        }
    }

    fn run_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_normalize_copies_metadata() {
        let doc = normalize(&metadata(), Address::Host("10.0.0.1".into()), run_start());
        assert_eq!(doc.category, "spam");
        assert_eq!(doc.version, "1.0");
        assert_eq!(doc.maintainer, "ops");
        assert_eq!(doc.ipset, "blocklist_x");
        assert_eq!(doc.timestamp, run_start());
    }

    #[test]
    fn test_ip_and_network_are_exclusive() {
        let host = normalize(&metadata(), Address::Host("10.0.0.1".into()), run_start());
        assert_eq!(host.get(Field::Ip).as_deref(), Some("10.0.0.1"));
        assert_eq!(host.get(Field::Network), None);

        let net = normalize(&metadata(), Address::Network("10.0.0.0/30".into()), run_start());
        assert_eq!(net.get(Field::Ip), None);
        assert_eq!(net.get(Field::Network).as_deref(), Some("10.0.0.0/30"));
    }

    #[test]
    fn test_id_strips_prefix() {
        let net = normalize(&metadata(), Address::Network("10.0.0.0/30".into()), run_start());
        assert_eq!(net.id(), "blocklist_x_10.0.0.0");
        let host = normalize(&metadata(), Address::Host("10.0.0.9".into()), run_start());
        assert_eq!(host.id(), "blocklist_x_10.0.0.9");
    }

    #[test]
    fn test_timestamp_field_is_epoch_millis() {
        let doc = normalize(&metadata(), Address::Host("10.0.0.1".into()), run_start());
        assert_eq!(doc.get(Field::Timestamp).as_deref(), Some("1709294400000"));
    }

    #[test]
    fn test_serialize_host_document() {
        let doc = normalize(&metadata(), Address::Host("10.0.0.1".into()), run_start());
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["ip"], "10.0.0.1");
        assert!(json.get("network").is_none());
        assert_eq!(json["ipset"], "blocklist_x");
        assert_eq!(json["timestamp"], 1_709_294_400_000i64);
    }

    #[test]
    fn test_serialize_network_document() {
        let doc = normalize(&metadata(), Address::Network("10.0.0.0/30".into()), run_start());
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["network"], "10.0.0.0/30");
        assert!(json.get("ip").is_none());
    }

    #[test]
    fn test_field_names_parse() {
        let fields: Vec<Field> = serde_yaml::from_str("[ip, network, category, timestamp]").unwrap();
        assert_eq!(
            fields,
            vec![Field::Ip, Field::Network, Field::Category, Field::Timestamp]
        );
        assert!(serde_yaml::from_str::<Field>("address").is_err());
    }

    #[test]
    fn test_normalize_entries_hosts_mode() {
        let entries = vec![
            AddressEntry::parse("10.0.0.1").unwrap(),
            AddressEntry::parse("10.0.0.0/30").unwrap(),
        ];
        let meta = metadata();
        let docs: Vec<_> = normalize_entries(&meta, &entries, CidrMode::Hosts, run_start()).collect();
        let ips: Vec<_> = docs.iter().filter_map(|d| d.get(Field::Ip)).collect();
        assert_eq!(
            ips,
            vec!["10.0.0.1", "10.0.0.0", "10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );
        assert!(docs.iter().all(|d| d.timestamp == run_start() && d.ipset == "blocklist_x"));
    }

    #[test]
    fn test_normalize_entries_range_mode() {
        let entries = vec![
            AddressEntry::parse("10.0.0.1").unwrap(),
            AddressEntry::parse("10.0.0.0/30").unwrap(),
        ];
        let meta = metadata();
        let docs: Vec<_> = normalize_entries(&meta, &entries, CidrMode::Range, run_start()).collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].address, Address::Network("10.0.0.0/30".into()));
    }
}
